//! Unified error type for airwatch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unauthorized (status={status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Provider API error (status={status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cache backend error: {0}")]
    Cache(String),

    #[error("Unsupported pollutant: {0}")]
    UnsupportedPollutant(String),

    #[error("Invalid concentration for {pollutant}: {value}")]
    InvalidConcentration { pollutant: String, value: f64 },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Maps a non-success HTTP status to the matching variant.
    ///
    /// 401/403 become `Unauthorized` so callers can log auth problems
    /// louder; the recovery path is the same either way.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(500).collect();
        match status {
            401 | 403 => Error::Unauthorized { status, message },
            _ => Error::Api { status, message },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Unauthorized { .. })
    }
}
