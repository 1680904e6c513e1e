//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Content was rejected by the moderation rules before publishing.
    #[error("content rejected: {0}")]
    ValidationRejected(String),

    /// A publish reached zero relays.
    #[error("no open relay to publish to")]
    NoOpenRelay,

    /// No signer capability was configured.
    #[error("no signer available")]
    SignerUnavailable,

    #[error("signer error: {0}")]
    Signer(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;
