//! Error handling

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PresenceError>;

/// Errors raised by the ingestion/aggregation pipeline
#[derive(Debug, Error)]
pub enum PresenceError {
    /// Address text is not 6 colon-separated hex octets (record is dropped)
    #[error("malformed identity: {0:?}")]
    MalformedIdentity(String),

    /// Source cannot be opened or queried (fatal for the run)
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single record cannot be decoded (record is skipped)
    #[error("corrupt record: {0}")]
    SourceCorrupt(String),

    /// No identity survived filtering
    #[error("nothing to plot")]
    EmptyResult,

    /// Identity filter expression could not be compiled
    #[error("invalid identity pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Configuration file or option is invalid
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PresenceError {
    /// Errors that only affect one record; the adapters skip those and keep going
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::MalformedIdentity(_) | Self::SourceCorrupt(_))
    }
}

impl From<rusqlite::Error> for PresenceError {
    fn from(err: rusqlite::Error) -> Self {
        PresenceError::SourceUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for PresenceError {
    fn from(err: std::io::Error) -> Self {
        PresenceError::SourceUnavailable(err.to_string())
    }
}
