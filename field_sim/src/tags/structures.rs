use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Declared data type of a controller tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Bool,
    Int,
    Real,
    String,
    /// Anything the synthesizer does not know how to produce.
    #[serde(other)]
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Int => "INT",
            DataType::Real => "REAL",
            DataType::String => "STRING",
            DataType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = std::convert::Infallible;

    // Never fails: unrecognised names map to `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => DataType::Bool,
            "INT" | "INTEGER" => DataType::Int,
            "REAL" | "FLOAT" => DataType::Real,
            "STRING" => DataType::String,
            _ => DataType::Unknown,
        })
    }
}

/// Represents the quality of a tag's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Good,
    Bad,
    Uncertain,
}

/// Direction of the latest change relative to the preceding value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl Trend {
    /// `Stable` unless both sides are numeric and differ.
    pub fn between(previous: Option<f64>, next: Option<f64>) -> Trend {
        match (previous, next) {
            (Some(prev), Some(next)) if next > prev => Trend::Up,
            (Some(prev), Some(next)) if next < prev => Trend::Down,
            _ => Trend::Stable,
        }
    }
}

/// Possible values of a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl TagValue {
    /// Numeric view used for trend and history. Booleans and text are not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(i) => Some(*i as f64),
            TagValue::Real(f) => Some(*f),
            TagValue::Bool(_) | TagValue::Text(_) => None,
        }
    }

    /// Value plotted on a chart: numbers as-is, booleans as 0/1.
    pub fn as_plot_value(&self) -> Option<f64> {
        match self {
            TagValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Real(r) => write!(f, "{:.2}", r),
            TagValue::Text(s) => f.write_str(s),
        }
    }
}

/// One synthesized sample: value plus its quality and trend.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub value: TagValue,
    pub quality: Quality,
    pub trend: Trend,
}

/// Static description of a tag to register with the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSpec {
    pub tag_id: String,
    pub tag_name: String,
    pub plc_id: String,
    pub address: String,
    pub data_type: DataType,
    #[serde(default)]
    pub unit: Option<String>,
}

impl TagSpec {
    pub fn new(tag_id: &str, tag_name: &str, plc_id: &str, address: &str, data_type: DataType) -> Self {
        TagSpec {
            tag_id: tag_id.to_string(),
            tag_name: tag_name.to_string(),
            plc_id: plc_id.to_string(),
            address: address.to_string(),
            data_type,
            unit: None,
        }
    }
}

/// Represents a single tag owned by the simulation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Unique identifier.
    pub tag_id: String,
    pub tag_name: String,
    /// Controller this tag lives on.
    pub plc_id: String,
    /// Brand-specific memory address, e.g. `DB100.DBD0`.
    pub address: String,
    pub data_type: DataType,
    pub value: TagValue,
    pub quality: Quality,
    /// Unix timestamp milliseconds of the last update.
    pub timestamp: u64,
    pub trend: Trend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Tag {
    /// Build a tag from its spec and an initial reading.
    pub fn from_spec(spec: TagSpec, reading: Reading, timestamp: u64) -> Self {
        Tag {
            tag_id: spec.tag_id,
            tag_name: spec.tag_name,
            plc_id: spec.plc_id,
            address: spec.address,
            data_type: spec.data_type,
            value: reading.value,
            quality: reading.quality,
            timestamp,
            trend: reading.trend,
            unit: spec.unit,
        }
    }
}

/// A single point of a tag's numeric history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub value: f64,
    pub timestamp: u64,
}
