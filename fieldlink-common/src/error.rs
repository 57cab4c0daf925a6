use thiserror::Error;

/// Common error type for fieldlink components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown metric kind: {0}")]
    UnknownKind(String),
}

/// Result type alias using fieldlink's Error.
pub type Result<T> = std::result::Result<T, Error>;
