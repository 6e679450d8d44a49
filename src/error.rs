//! Error types for the BBO relay

use std::time::Duration;

use thiserror::Error;

/// BBO relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("WebSocket connection error: {0}")]
    Connection(String),

    #[error("Connection handshake timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("Failed to send frame: {0}")]
    Send(String),

    #[error("Failed to parse frame: {0}")]
    Parse(String),

    #[error("Delivery to {recipient} failed: {reason}")]
    Delivery { recipient: i64, reason: String },

    #[error("Subscriber persistence error: {0}")]
    Persistence(String),

    #[error("REST API error: {0}")]
    RestApi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Stream supervisor has been stopped")]
    SupervisorStopped,
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::RestApi(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Persistence(err.to_string())
    }
}

impl From<prometheus::Error> for RelayError {
    fn from(err: prometheus::Error) -> Self {
        RelayError::Metrics(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
