use tracing_subscriber::EnvFilter;

/// Initialize logging. `RUST_LOG` wins over `default_level` when set.
/// Calling this more than once keeps the first subscriber.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
