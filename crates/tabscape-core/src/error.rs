use thiserror::Error;

/// All the ways a request can go wrong in Tabscape
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cache error: {0}")]
    CacheError(#[from] tabscape_cache::CacheError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Malformed request: {0}")]
    BadRequest(#[from] serde_json::Error),

    #[error("Malformed request: {0}")]
    BadEncoding(#[from] std::str::Utf8Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
