use crate::error::{FetchError, RecordError};
use crate::tags::engine::SimulationEngine;
use crate::tags::structures::{DataType, Quality, Tag, TagValue, Trend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Header carrying the caller's session, when one exists.
pub const SESSION_HEADER: &str = "X-Session-Id";

/// Body of `GET /api/gateway/data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDataResponse {
    #[serde(default)]
    pub tag_data: Vec<RawTagRecord>,
}

/// A tag record as it appears on the wire. Everything is optional until
/// [`RawTagRecord::into_live_tag`] has checked it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTagRecord {
    #[serde(default)]
    pub tag_id: Option<String>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub plc_name: Option<String>,
    #[serde(default)]
    pub plc_id: Option<String>,
    /// Unix ms. Other encodings are ignored and replaced by the receive time.
    #[serde(default)]
    pub last_updated: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl From<&Tag> for RawTagRecord {
    fn from(tag: &Tag) -> Self {
        let value = match &tag.value {
            TagValue::Bool(b) => Value::from(*b),
            TagValue::Int(i) => Value::from(*i),
            TagValue::Real(r) => Value::from(*r),
            TagValue::Text(s) => Value::from(s.clone()),
        };
        RawTagRecord {
            tag_id: Some(tag.tag_id.clone()),
            tag_name: Some(tag.tag_name.clone()),
            plc_name: None,
            plc_id: Some(tag.plc_id.clone()),
            last_updated: Some(Value::from(tag.timestamp)),
            value: Some(value),
            quality: Some(quality_name(tag.quality).to_string()),
            data_type: Some(tag.data_type.to_string()),
            unit: tag.unit.clone(),
        }
    }
}

fn quality_name(quality: Quality) -> &'static str {
    match quality {
        Quality::Good => "good",
        Quality::Bad => "bad",
        Quality::Uncertain => "uncertain",
    }
}

fn parse_quality(raw: Option<&str>) -> Quality {
    match raw.map(|q| q.trim().to_ascii_lowercase()) {
        None => Quality::Good,
        Some(q) if q == "good" => Quality::Good,
        Some(q) if q == "bad" => Quality::Bad,
        Some(_) => Quality::Uncertain,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Canonical tag shape held by the live-data aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTag {
    pub tag_id: String,
    pub tag_name: String,
    pub plc_name: Option<String>,
    pub plc_id: Option<String>,
    pub value: TagValue,
    pub quality: Quality,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub last_updated: u64,
    /// Relative to the value previously displayed for this tag.
    pub trend: Trend,
}

impl RawTagRecord {
    /// Validate and map into a [`LiveTag`].
    ///
    /// `previous` is the value currently on display for this tag id; the
    /// trend is computed against it rather than taken from the wire.
    pub fn into_live_tag(
        self,
        previous: Option<&TagValue>,
        received_at: u64,
    ) -> Result<LiveTag, RecordError> {
        let tag_id = match self.tag_id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(RecordError::MissingTagId),
        };

        let value = match self.value {
            None | Some(Value::Null) => return Err(RecordError::MissingValue { tag_id }),
            Some(Value::Bool(b)) => TagValue::Bool(b),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => TagValue::Int(i),
                None => TagValue::Real(n.as_f64().unwrap_or_default()),
            },
            Some(Value::String(s)) => TagValue::Text(s),
            Some(other) => {
                return Err(RecordError::InvalidValue {
                    tag_id,
                    kind: json_kind(&other),
                })
            }
        };

        let data_type = match &self.data_type {
            Some(name) => name.parse().unwrap_or(DataType::Unknown),
            None => match value {
                TagValue::Bool(_) => DataType::Bool,
                TagValue::Int(_) => DataType::Int,
                TagValue::Real(_) => DataType::Real,
                TagValue::Text(_) => DataType::String,
            },
        };

        let trend = Trend::between(previous.and_then(TagValue::as_f64), value.as_f64());
        let last_updated = self
            .last_updated
            .as_ref()
            .and_then(Value::as_u64)
            .unwrap_or(received_at);

        Ok(LiveTag {
            tag_name: self.tag_name.unwrap_or_else(|| tag_id.clone()),
            tag_id,
            plc_name: self.plc_name,
            plc_id: self.plc_id,
            value,
            quality: parse_quality(self.quality.as_deref()),
            data_type,
            unit: self.unit,
            last_updated,
            trend,
        })
    }
}

/// Anything the aggregator can poll for tag snapshots.
#[async_trait]
pub trait TagSource: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &str;

    /// Fetch the current records for `tag_ids`. Unknown ids are simply absent.
    async fn fetch(
        &self,
        tag_ids: &[String],
        session_id: Option<&str>,
    ) -> Result<Vec<RawTagRecord>, FetchError>;
}

/// Reads straight from an in-process engine.
#[derive(Debug, Clone)]
pub struct EngineSource {
    engine: SimulationEngine,
}

impl EngineSource {
    pub fn new(engine: SimulationEngine) -> Self {
        EngineSource { engine }
    }
}

#[async_trait]
impl TagSource for EngineSource {
    fn name(&self) -> &str {
        "engine"
    }

    async fn fetch(
        &self,
        tag_ids: &[String],
        _session_id: Option<&str>,
    ) -> Result<Vec<RawTagRecord>, FetchError> {
        Ok(self
            .engine
            .tags_by_ids(tag_ids)
            .iter()
            .map(RawTagRecord::from)
            .collect())
    }
}

/// Polls a remote `GET /api/gateway/data` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unavailable(format!("cannot build HTTP client: {}", e)))?;
        Ok(HttpSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn data_url(&self) -> String {
        format!("{}/api/gateway/data", self.base_url)
    }
}

#[async_trait]
impl TagSource for HttpSource {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn fetch(
        &self,
        tag_ids: &[String],
        session_id: Option<&str>,
    ) -> Result<Vec<RawTagRecord>, FetchError> {
        let url = self.data_url();
        let mut request = self
            .client
            .get(&url)
            .query(&[("tagIds", tag_ids.join(","))]);
        if let Some(session) = session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body: TagDataResponse = response
            .json()
            .await
            .map_err(|source| FetchError::Decode { url, source })?;
        Ok(body.tag_data)
    }
}
