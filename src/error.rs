use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StatsError {
    #[error("invalid area code: {0}")]
    InvalidAreaCode(String),

    #[error("invalid run mode: {0}")]
    InvalidRunMode(String),

    #[error("missing settings file settings.json in current directory")]
    #[diagnostic(help("pass --settings <path> or create settings.json"))]
    MissingConfig,

    #[error("failed to read settings file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON settings: {0}")]
    ConfigParse(String),

    #[error("invalid settings: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("area catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("stats request for {location} failed: {message}")]
    FetchFailed { location: String, message: String },

    #[error("malformed payload for {area}: {reason}")]
    MalformedPayload { area: String, reason: String },

    #[error("destination {destination} unavailable: {message}")]
    DestinationUnavailable {
        destination: String,
        message: String,
    },

    #[error("write to destination {destination} failed: {message}")]
    DestinationWriteFailed {
        destination: String,
        message: String,
    },
}
