use crate::tags::structures::{DataType, TagSpec};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Prefix of environment overrides, e.g. `FIELDSIM__ENGINE__UPDATE_INTERVAL_MS=500`.
pub const ENV_PREFIX: &str = "FIELDSIM";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlcConfig {
    pub id: String,
    pub name: String,
    /// Free-form brand name; decides which address syntax is enforced.
    pub brand: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TagConfig {
    pub tag_id: String,
    pub tag_name: String,
    pub plc_id: String, // Must match a configured PLC id
    pub address: String,
    pub data_type: DataType,
    #[serde(default)]
    pub unit: Option<String>,
}

impl TagConfig {
    pub fn to_spec(&self) -> TagSpec {
        TagSpec {
            tag_id: self.tag_id.clone(),
            tag_name: self.tag_name.clone(),
            plc_id: self.plc_id.clone(),
            address: self.address.clone(),
            data_type: self.data_type,
            unit: self.unit.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub update_interval_ms: u64,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            update_interval_ms: 1_000,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GatewaySettings {
    pub handshake_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Connect with this code at startup.
    pub activation_code: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            handshake_delay_ms: 2_000,
            heartbeat_interval_ms: 5_000,
            activation_code: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AggregatorSettings {
    pub update_rate_ms: u64,
    pub throttle_ratio: f64,
    /// Poll this remote server instead of the local engine.
    pub source_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Tags to follow live from the binary. Empty disables the aggregator.
    pub watch_tags: Vec<String>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        AggregatorSettings {
            update_rate_ms: 2_000,
            throttle_ratio: 0.8,
            source_url: None,
            request_timeout_ms: 5_000,
            watch_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "demo_plcs")] // A small demo plant when nothing is configured
    pub plcs: Vec<PlcConfig>,
    #[serde(default = "demo_tags")]
    pub tags: Vec<TagConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn demo_plcs() -> Vec<PlcConfig> {
    vec![
        PlcConfig {
            id: "plc-1".to_string(),
            name: "Line 1 S7-1500".to_string(),
            brand: "Siemens".to_string(),
        },
        PlcConfig {
            id: "plc-2".to_string(),
            name: "Packaging CompactLogix".to_string(),
            brand: "Allen-Bradley".to_string(),
        },
    ]
}

fn demo_tags() -> Vec<TagConfig> {
    let tag = |id: &str, name: &str, plc: &str, address: &str, data_type: DataType, unit: Option<&str>| TagConfig {
        tag_id: id.to_string(),
        tag_name: name.to_string(),
        plc_id: plc.to_string(),
        address: address.to_string(),
        data_type,
        unit: unit.map(str::to_string),
    };
    vec![
        tag("T-101", "Reactor Temperature", "plc-1", "DB100.DBD0", DataType::Real, Some("°C")),
        tag("P-102", "Line Pressure", "plc-1", "DB100.DBD4", DataType::Real, Some("bar")),
        tag("M-103", "Mixer Running", "plc-1", "Q0.1", DataType::Bool, None),
        tag("C-201", "Bottle Count", "plc-2", "N7:0", DataType::Int, Some("pcs")),
        tag("S-202", "Conveyor State", "plc-2", "Program:MainProgram.ConveyorState", DataType::String, None),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings::default(),
            engine: EngineSettings::default(),
            gateway: GatewaySettings::default(),
            aggregator: AggregatorSettings::default(),
            log_level: default_log_level(),
            plcs: demo_plcs(),
            tags: demo_tags(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then `FIELDSIM__*` environment overrides.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn save(&self, config_path: &Path) -> io::Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(config_path, toml_string)
    }

    pub fn plc(&self, plc_id: &str) -> Option<&PlcConfig> {
        self.plcs.iter().find(|plc| plc.id == plc_id)
    }
}
