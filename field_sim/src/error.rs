use thiserror::Error;

/// Why a poll of a tag source produced no data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode tag data from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("tag source unavailable: {0}")]
    Unavailable(String),
}

/// A wire record that cannot be turned into a displayable tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has no tagId")]
    MissingTagId,

    #[error("tag {tag_id}: record has no value")]
    MissingValue { tag_id: String },

    #[error("tag {tag_id}: value must be a boolean, number or string, got {kind}")]
    InvalidValue { tag_id: String, kind: &'static str },
}
