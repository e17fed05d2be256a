//! # Switchyard Core
//!
//! Foundation types for dispatching exchanges carried by a multiplexed,
//! bidirectional-stream transport (one long-lived session carrying many
//! concurrent request/response exchanges).
//!
//! ## Contents
//!
//! - **Headers**: the flat, pseudo-header aware header set ([`Headers`])
//! - **Exchanges**: the transport interface ([`ExchangeStream`]) and the
//!   handle routing nodes work with ([`Exchange`]), including the
//!   [`Responder`] chain used to augment responses
//! - **Contexts**: connection-scoped [`SessionContext`] and exchange-scoped
//!   [`StreamContext`]
//! - **Errors**: setup-time and transport errors
//!
//! ```text
//! session open ──▶ SessionContext
//!   exchange open ──▶ StreamContext (wraps SessionContext) ──▶ routing tree
//! ```

pub mod context;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod memory;
pub mod query;

pub use context::{ContextData, RouteContext, SessionContext, StreamContext};
pub use error::{BoxError, SetupError, SetupResult, StepResult, TransportError, TransportResult};
pub use exchange::{
    BoxedResponder, Exchange, ExchangeStream, PatchedResponder, RespondOptions, Responder,
    ResponseHead,
};
pub use headers::{Headers, StreamFlags, names};
pub use memory::MemoryExchange;

pub use bytes::Bytes;
pub use http::{Method, StatusCode};
pub use serde_json::{Value, json};

/// Prelude for common imports.
pub mod prelude {
    pub use super::context::{ContextData, RouteContext, SessionContext, StreamContext};
    pub use super::error::{BoxError, StepResult};
    pub use super::exchange::{Exchange, RespondOptions, ResponseHead};
    pub use super::headers::{Headers, StreamFlags, names};
}
