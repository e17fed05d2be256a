//! Unified error types for the Switchyard core.
//!
//! Pipeline steps themselves return [`BoxError`] so that leaf handlers can use
//! `?` on anything; the enums here cover the failures the core raises on its
//! own behalf.

use thiserror::Error;

/// A type-erased error returned by pipeline steps.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Setup Errors
// =============================================================================

/// Errors raised while wiring a routing tree.
///
/// These are configuration errors: they surface when a node is built, never
/// while an exchange is being dispatched.
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    /// A routing node was created without a selector field.
    #[error("a selector field must be set")]
    MissingSelectorField,

    /// The selector pattern failed to compile.
    #[error("invalid selector pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The selector pattern does not have exactly one capturing group.
    #[error("selector pattern '{pattern}' must have exactly one capturing group, found {groups}")]
    CaptureGroupCount {
        /// The offending pattern source.
        pattern: String,
        /// Number of capturing groups found.
        groups: usize,
    },
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur while talking to an exchange stream.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A response head was already sent on this exchange.
    #[error("response headers already sent on stream {stream_id}")]
    HeadersAlreadySent {
        /// The stream the second response was attempted on.
        stream_id: u32,
    },

    /// The writable side of the stream was already ended.
    #[error("stream {stream_id} is no longer writable")]
    WritableEnded {
        /// The ended stream.
        stream_id: u32,
    },

    /// The stream was closed by the peer or the session.
    #[error("stream closed: {reason}")]
    Closed {
        /// Reason for closure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for routing-tree construction.
pub type SetupResult<T> = Result<T, SetupError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type of a single pipeline step.
pub type StepResult = Result<(), BoxError>;
