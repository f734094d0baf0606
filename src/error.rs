//! Error types for the auto-ducking service

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A native binding required by the worker could not be brought up.
    /// Restarting does not help, so the supervisor treats it as permanent.
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio metering errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Session enumeration failed: {0}")]
    Enumeration(String),

    #[error("Peak query failed: {0}")]
    PeakQuery(String),

    #[error("Endpoint unavailable: {0}")]
    Endpoint(String),

    #[error("WASAPI error: {0}")]
    Wasapi(String),
}

/// Media session errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Session directory query failed: {0}")]
    Directory(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Command not acknowledged by the player")]
    Rejected,

    #[error("SMTC error: {0}")]
    Smtc(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
