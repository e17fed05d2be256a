//! Switchyard Runtime - the layer a transport talks to.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `SwitchyardConfig`)
//! - Logging setup (`LoggingBuilder`)
//! - The server wrapper (`Server`) turning transport events into routing
//!   calls, with session lifecycle notifications
//!
//! ```ignore
//! use switchyard_runtime::Server;
//!
//! let server = Server::builder().build(root)?;
//!
//! // from the transport's callbacks:
//! let session = server.on_session_open(initial_data);
//! server.spawn_exchange(stream, headers, flags, &session);
//! server.on_session_close(&session);
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod server;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, Profile, ServerConfig,
    SwitchyardConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use server::{Server, ServerBuilder, ServerEvent, ServerStats};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
