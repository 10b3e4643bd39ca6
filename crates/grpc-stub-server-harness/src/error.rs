use thiserror::Error;

/// Errors reported synchronously to the code driving the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    /// The endpoint is not in a state that allows the requested operation
    #[error("Usage error: {0}")]
    UsageError(String),
}

/// Errors produced while transcoding between wire bytes and generic documents
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("message does not match schema: {0}")]
    Schema(#[from] serde_json::Error),
}
