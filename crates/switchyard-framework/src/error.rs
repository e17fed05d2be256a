//! Errors raised by the built-in descriptors.

use thiserror::Error;

use switchyard_core::TransportError;

/// Failure to turn a request body into context fields.
#[derive(Debug, Error)]
pub enum BodyError {
    /// The body could not be read from the exchange.
    #[error("failed to read request body: {0}")]
    Read(#[from] TransportError),

    /// The body is not valid UTF-8.
    #[error("request body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The body is not valid JSON.
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for body parsing.
pub type BodyResult<T> = Result<T, BodyError>;
