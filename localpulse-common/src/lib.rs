use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;

pub use config::PulseConfig;

/// `User-Agent` value sent with every outbound probe and load request.
pub const USER_AGENT: &str = "LocalPulse/1.0";

/// Error types for LocalPulse operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{0} already running")]
    AlreadyRunning(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// One endpoint as persisted in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result type for LocalPulse operations
pub type Result<T> = std::result::Result<T, PulseError>;
