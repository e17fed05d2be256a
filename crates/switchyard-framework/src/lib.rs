//! # Switchyard Framework
//!
//! Routing trees for exchanges carried by a multiplexed stream transport.
//!
//! This layer provides:
//! - [`Descriptor`] pipelines (pre-steps, main handler, post-steps, error step)
//! - [`Service`] leaves selecting a descriptor from a header
//! - [`ServiceManager`] inner nodes selecting a child from a header, with
//!   cross-origin headers and alternative service announcements
//! - ready-made leaf steps in [`descriptors`]
//! - a [`tower::Service`] entry point ([`Router`])
//!
//! ```text
//! ServiceManager(":path", "^/([a-z]+)")
//!   ├── "api"  ─▶ ServiceManager(":path", "^/([a-z]+)")
//!   │              └── "users" ─▶ Service("x-action") ─▶ Descriptor
//!   └── ""     ─▶ Service(":method") ─▶ Descriptor(file_post)
//! ```

pub mod cors;
pub mod descriptor;
pub mod descriptors;
pub mod error;
pub mod handler;
pub mod manager;
pub mod selector;
pub mod service;

pub use cors::CorsConfig;
pub use descriptor::{
    Descriptor, ErrorDescriptor, Post, PostDescriptor, Pre, PreDescriptor, StepDescriptor,
    StepKind,
};
pub use error::{BodyError, BodyResult};
pub use handler::{
    BoxedErrorHandler, BoxedHandler, ErrorHandler, Handler, Invocation, StepOutcome, into_handler,
};
pub use manager::{Dispatch, Processor, Router, ServiceManager};
pub use selector::{DEFAULT_MARKER, Selection, Selector};
pub use service::Service;

pub use futures::future::BoxFuture;
