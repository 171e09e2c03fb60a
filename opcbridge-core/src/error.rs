use crate::status::StatusCode;
use thiserror::Error;

/// Main error type for opcbridge operations
#[derive(Error, Debug)]
pub enum OpcError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timeout")]
    Timeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Service failed with status {0}")]
    ServiceFailure(StatusCode),
}

/// Result type alias for opcbridge operations
pub type OpcResult<T> = Result<T, OpcError>;
