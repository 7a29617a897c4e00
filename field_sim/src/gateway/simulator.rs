//! Simulated remote gateway: activation-code handshake plus heartbeat.
//!
//! Nothing here talks to a network. The handshake is a fixed delay followed
//! by a pattern check on the activation code.

use crate::tags::structures::now_millis;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{info, trace, warn};

/// Latency of the simulated handshake.
pub const DEFAULT_HANDSHAKE_DELAY: Duration = Duration::from_secs(2);

const GATEWAY_OS: &str = "FieldGate Linux 5.15 LTS";
const GATEWAY_FIRMWARE: &str = "3.8.2";

fn activation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^DEMO-([A-Z0-9]+)-FAC(\d{3})-([A-Z0-9]{5})$")
            .expect("activation code pattern is a valid regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Error,
}

/// Observable state of the simulated gateway link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConnection {
    pub status: ConnectionStatus,
    pub activation_code: Option<String>,
    pub company: Option<String>,
    pub facility_id: Option<String>,
    /// Unix ms of the last heartbeat, set while connected.
    pub last_ping: Option<u64>,
}

/// Cosmetic description of the device we pretend to have reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    pub gateway_id: String,
    pub hostname: String,
    pub os: String,
    pub version: String,
    pub ip_address: String,
    pub cpu: String,
    pub memory_mb: u32,
    pub storage_gb: u32,
}

impl GatewayInfo {
    fn for_facility(company: &str, facility_id: &str, serial: &str) -> Self {
        let facility_num: u32 = facility_id.parse().unwrap_or(0);
        let host_octet = serial.bytes().fold(0u32, |acc, b| acc.wrapping_add(b as u32)) % 200 + 20;
        GatewayInfo {
            gateway_id: format!("GW-{}-{}-{}", company, facility_id, serial),
            hostname: format!("{}-fac{}-gw", company.to_ascii_lowercase(), facility_id),
            os: GATEWAY_OS.to_string(),
            version: GATEWAY_FIRMWARE.to_string(),
            ip_address: format!("10.{}.{}.{}", 10 + facility_num % 200, facility_num % 256, host_octet),
            cpu: "ARM Cortex-A72 quad-core 1.5GHz".to_string(),
            memory_mb: 4096,
            storage_gb: 32,
        }
    }
}

/// Result of a handshake attempt. Failures are reported here, never as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayInfo>,
}

#[derive(Debug, Default)]
struct LinkState {
    connection: GatewayConnection,
    // Bumped by `disconnect` so a handshake still in flight can tell it was cancelled.
    epoch: u64,
}

/// Handshake/heartbeat state machine for one gateway.
#[derive(Debug, Clone)]
pub struct GatewaySimulator {
    state: Arc<RwLock<LinkState>>,
    handshake_delay: Duration,
}

impl GatewaySimulator {
    pub fn new() -> Self {
        Self::with_handshake_delay(DEFAULT_HANDSHAKE_DELAY)
    }

    pub fn with_handshake_delay(handshake_delay: Duration) -> Self {
        GatewaySimulator {
            state: Arc::new(RwLock::new(LinkState::default())),
            handshake_delay,
        }
    }

    pub async fn connection(&self) -> GatewayConnection {
        self.state.read().await.connection.clone()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.connection.status
    }

    /// Run the simulated handshake for `activation_code`.
    ///
    /// Codes look like `DEMO-ACME-FAC001-X7K9P`. A malformed code moves the
    /// link to `Error` and leaves the stored code and facility untouched.
    pub async fn connect(&self, activation_code: &str) -> ConnectOutcome {
        let started_epoch = self.state.read().await.epoch;
        info!(delay_ms = self.handshake_delay.as_millis() as u64, "gateway handshake started");
        sleep(self.handshake_delay).await;

        let mut state = self.state.write().await;
        if state.epoch != started_epoch {
            warn!("gateway handshake cancelled by disconnect");
            return ConnectOutcome {
                success: false,
                message: "Handshake cancelled".to_string(),
                gateway: None,
            };
        }

        let Some(caps) = activation_pattern().captures(activation_code) else {
            state.connection.status = ConnectionStatus::Error;
            warn!("gateway handshake rejected: malformed activation code");
            return ConnectOutcome {
                success: false,
                message: "Invalid activation code. Expected format DEMO-<COMPANY>-FAC<###>-<XXXXX>"
                    .to_string(),
                gateway: None,
            };
        };

        let company = caps[1].to_string();
        let facility_id = caps[2].to_string();
        let gateway = GatewayInfo::for_facility(&company, &facility_id, &caps[3]);

        state.connection = GatewayConnection {
            status: ConnectionStatus::Connected,
            activation_code: Some(activation_code.to_string()),
            company: Some(company.clone()),
            facility_id: Some(facility_id.clone()),
            last_ping: Some(now_millis()),
        };
        info!(%company, %facility_id, gateway_id = %gateway.gateway_id, "gateway connected");

        ConnectOutcome {
            success: true,
            message: format!("Connected to {} facility {}", company, facility_id),
            gateway: Some(gateway),
        }
    }

    /// Reset to `Disconnected`, clearing the code, facility and last ping.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;
        state.connection = GatewayConnection::default();
        state.epoch += 1;
        info!("gateway disconnected");
    }

    /// Refresh `last_ping` every `every` while connected.
    /// Must be called from within a Tokio runtime.
    pub fn start_heartbeat(&self, every: Duration) -> HeartbeatHandle {
        let every = every.max(Duration::from_millis(1));
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let mut state = state.write().await;
                if state.connection.status == ConnectionStatus::Connected {
                    let now = now_millis();
                    state.connection.last_ping = Some(now);
                    trace!(last_ping = now, "gateway heartbeat");
                }
            }
        });
        HeartbeatHandle { handle }
    }
}

impl Default for GatewaySimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Running heartbeat task. Cancelled by [`HeartbeatHandle::cancel`] or on drop.
#[derive(Debug)]
pub struct HeartbeatHandle {
    handle: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
