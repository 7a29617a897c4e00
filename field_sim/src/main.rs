use field_sim::api::rest::{create_api_routes, SharedAppState};
use field_sim::config::settings::Settings;
use field_sim::gateway::simulator::GatewaySimulator;
use field_sim::live::aggregator::{AggregatorConfig, LiveDataAggregator};
use field_sim::live::mode::{ModeFlags, ModeNotifier};
use field_sim::live::source::{EngineSource, HttpSource, TagSource};
use field_sim::logging::init_logging;
use field_sim::tags::address::validate_address;
use field_sim::tags::engine::SimulationEngine;
use field_sim::tags::structures::Quality;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();

    // --- Load Configuration ---
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            init_logging("info");
            error!(
                "FATAL: Failed to load configuration from {:?}: {}",
                config_path, e
            );
            std::process::exit(1);
        }
    };
    init_logging(&settings.log_level);
    info!("Field data simulator starting...");
    info!(
        "Configuration loaded: {} PLCs, {} tags",
        settings.plcs.len(),
        settings.tags.len()
    );

    // --- Initialize Simulation Engine ---
    let engine = match settings.engine.seed {
        Some(seed) => SimulationEngine::with_seed(seed),
        None => SimulationEngine::new(),
    };

    // --- Register Tags ---
    for tag_config in &settings.tags {
        let Some(plc) = settings.plc(&tag_config.plc_id) else {
            warn!(
                "Skipping tag '{}' because its PLC '{}' is not configured.",
                tag_config.tag_id, tag_config.plc_id
            );
            continue;
        };
        if !validate_address(&plc.brand, &tag_config.address) {
            warn!(
                "Skipping tag '{}': address '{}' is not valid for {}.",
                tag_config.tag_id, tag_config.address, plc.brand
            );
            continue;
        }
        if engine.add_tag(tag_config.to_spec()) {
            info!(
                "Registered tag: {} (PLC: {}, Address: {}, Type: {})",
                tag_config.tag_id, plc.name, tag_config.address, tag_config.data_type
            );
        } else {
            warn!("Duplicate tag id '{}' ignored.", tag_config.tag_id);
        }
    }

    engine.start(Duration::from_millis(settings.engine.update_interval_ms));
    let _quality_monitor = engine.subscribe(|tags| {
        let degraded = tags.iter().filter(|t| t.quality != Quality::Good).count();
        debug!(tags = tags.len(), degraded, "snapshot published");
    });

    // --- Gateway Simulator ---
    let gateway = GatewaySimulator::with_handshake_delay(Duration::from_millis(
        settings.gateway.handshake_delay_ms,
    ));
    let _heartbeat =
        gateway.start_heartbeat(Duration::from_millis(settings.gateway.heartbeat_interval_ms));
    if let Some(code) = settings.gateway.activation_code.clone() {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let outcome = gateway.connect(&code).await;
            if outcome.success {
                info!("Gateway auto-connect: {}", outcome.message);
            } else {
                warn!("Gateway auto-connect failed: {}", outcome.message);
            }
        });
    }

    // --- Optional live watcher ---
    let modes = ModeNotifier::new(ModeFlags {
        session_id: None,
        demo_mode: true,
    });
    let watcher = if settings.aggregator.watch_tags.is_empty() {
        None
    } else {
        let aggregator = Arc::new(start_watcher(&settings, &engine, &modes)?);
        let every = Duration::from_millis(settings.aggregator.update_rate_ms.saturating_mul(5));
        let reporter = tokio::spawn(report(Arc::clone(&aggregator), every));
        Some((aggregator, reporter))
    };

    // --- Start API Server ---
    info!("Starting API server...");
    let addr: SocketAddr = settings.server.bind.parse()?;
    let app_state = SharedAppState {
        engine: engine.clone(),
        gateway,
        start_time,
        settings: Arc::new(RwLock::new(settings)),
    };

    let app = create_api_routes()
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    if let Some((aggregator, reporter)) = watcher {
        reporter.abort();
        // Wait for the reporter to release its handle so the aggregator shuts down on drop.
        let _ = reporter.await;
        drop(aggregator);
        info!("Live watcher stopped");
    }
    engine.stop();
    Ok(())
}

/// Follow the configured tags through a live aggregator and log what it sees.
fn start_watcher(
    settings: &Settings,
    engine: &SimulationEngine,
    modes: &ModeNotifier,
) -> Result<LiveDataAggregator, Box<dyn std::error::Error>> {
    let source: Arc<dyn TagSource> = match &settings.aggregator.source_url {
        Some(url) => Arc::new(HttpSource::new(
            url,
            Duration::from_millis(settings.aggregator.request_timeout_ms),
        )?),
        None => Arc::new(EngineSource::new(engine.clone())),
    };
    info!(
        "Live watcher polling {} for {} tags",
        source.name(),
        settings.aggregator.watch_tags.len()
    );

    let update_rate = Duration::from_millis(settings.aggregator.update_rate_ms);
    let aggregator = LiveDataAggregator::spawn(
        source,
        modes,
        AggregatorConfig {
            update_rate,
            throttle_ratio: settings.aggregator.throttle_ratio,
            live_mode: true,
        },
    );
    aggregator.set_selected_tags(settings.aggregator.watch_tags.iter().cloned());

    Ok(aggregator)
}

/// Periodically summarise the watcher's view.
async fn report(aggregator: Arc<LiveDataAggregator>, every: Duration) {
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    loop {
        ticker.tick().await;
        let view = aggregator.view();
        for (tag_id, tag) in &view.live_data {
            let points = view.sparklines.get(tag_id).map_or(0, Vec::len);
            info!(%tag_id, value = %tag.value, trend = ?tag.trend, points, "live");
        }
    }
}
