//! # Switchyard
//!
//! Header-driven dispatch for exchanges carried by a multiplexed stream
//! transport: one long-lived session, many concurrent request/response
//! exchanges.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌────────┐     ┌────────────────┐     ┌─────────┐     ┌────────────┐
//! │ Transport │────▶│ Server │────▶│ ServiceManager │────▶│ Service │────▶│ Descriptor │
//! └───────────┘     └────────┘     │ (nested, 0..n) │     └─────────┘     │ pre ▸ main │
//!                                  └────────────────┘                     │ ▸ post     │
//!                                                                         └────────────┘
//! ```
//!
//! - **Server**: turns session and exchange events into routing calls
//! - **ServiceManager**: selects a child from a header, optionally consuming
//!   a prefix of it; applies cross-origin headers and alternative service
//! - **Service**: selects a descriptor from a header
//! - **Descriptor**: the pipeline that answers the exchange
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchyard::prelude::*;
//!
//! let root = ServiceManager::with_pattern(":path", "^/([a-z]+)")?
//!     .service("hello", Service::new(":method")?.descriptor(
//!         "GET",
//!         Descriptor::new(|inv: Invocation| async move {
//!             inv.exchange.respond_status(StatusCode::OK)
//!         }),
//!     ))
//!     .service("", Service::new(":method")?.post(not_found_post()));
//!
//! let server = Server::builder().build(root)?;
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `switchyard.toml` (default)
//! - `yaml-config`: load `switchyard.yaml`
//! - `json-log`: JSON log output

pub use switchyard_core as core;
pub use switchyard_framework as framework;
pub use switchyard_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchyard::prelude::*;
/// ```
pub mod prelude {
    // Server - entry point for transports
    pub use switchyard_runtime::{Server, ServerEvent, SwitchyardConfig};

    // Routing tree
    pub use switchyard_framework::{
        CorsConfig, Descriptor, ErrorDescriptor, Invocation, PostDescriptor, PreDescriptor,
        Service, ServiceManager,
    };

    // Ready-made steps
    pub use switchyard_framework::descriptors::{
        ValidationResult, Validator, file_post, file_pre, general_error, json_pre,
        not_found_post, not_found_pre, validate_pre,
    };

    // Exchanges and contexts
    pub use switchyard_core::{
        BoxError, ContextData, Exchange, Headers, MemoryExchange, RespondOptions, ResponseHead,
        SessionContext, StatusCode, StreamContext, json, names,
    };
}
