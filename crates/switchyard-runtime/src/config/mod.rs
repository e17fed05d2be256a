//! Configuration module for the Switchyard runtime.
//!
//! This module provides layered configuration loading and validation for the
//! server wrapper, the cross-origin settings of the root manager and logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ServerConfig, SpanEventConfig,
    SwitchyardConfig,
};
pub use validation::validate_config;
