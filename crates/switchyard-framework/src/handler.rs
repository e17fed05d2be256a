//! Handler system for the Switchyard framework.
//!
//! A handler is the function a pipeline step runs. The [`Handler`] trait is
//! implemented for every closure or async fn taking an [`Invocation`], and
//! [`ErrorHandler`] for those additionally taking the error being handled.
//!
//! # Return values
//!
//! Handlers return anything implementing [`StepOutcome`]:
//!
//! - `()`: the step always succeeds
//! - `Result<(), E>` where `E: Into<BoxError>`: an `Err` aborts the pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard_framework::{Invocation, BoxError};
//!
//! // Never fails
//! async fn log_path(inv: Invocation) {
//!     tracing::info!(path = ?inv.headers.path(), "exchange");
//! }
//!
//! // May fail, error is routed to the nearest error descriptor
//! async fn load(inv: Invocation) -> Result<(), BoxError> {
//!     let body = inv.exchange.read_to_end().await?;
//!     inv.context.set("size", body.len());
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use switchyard_core::{BoxError, Exchange, Headers, StepResult, StreamContext, StreamFlags};

// ============================================================================
// Invocation
// ============================================================================

/// Everything a pipeline step receives for one exchange.
///
/// Cloning is cheap; every step of a pipeline gets its own clone referring to
/// the same exchange and context.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The exchange, with the responder chain of the enclosing routing nodes.
    pub exchange: Exchange,
    /// The raw inbound headers, untouched by routing.
    pub headers: Arc<Headers>,
    /// Transport flags.
    pub flags: StreamFlags,
    /// The exchange context.
    pub context: StreamContext,
}

impl Invocation {
    /// Bundles the arguments of a dispatch.
    pub fn new(
        exchange: Exchange,
        headers: Arc<Headers>,
        flags: StreamFlags,
        context: StreamContext,
    ) -> Self {
        Self {
            exchange,
            headers,
            flags,
            context,
        }
    }
}

// ============================================================================
// StepOutcome - Handle handler return values
// ============================================================================

/// A type that can be returned from a handler.
pub trait StepOutcome: Send + 'static {
    /// Converts the value into the result of the step.
    fn into_step_result(self) -> StepResult;
}

/// Implementation for `()` - the step succeeded.
impl StepOutcome for () {
    fn into_step_result(self) -> StepResult {
        Ok(())
    }
}

/// Implementation for `Result<(), E>` - errors are boxed.
impl<E> StepOutcome for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_step_result(self) -> StepResult {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler Traits
// ============================================================================

/// The function run by a pre-, main or post-step.
///
/// Implemented for every `Fn(Invocation) -> impl Future<Output: StepOutcome>`.
pub trait Handler: Send + Sync + 'static {
    /// Runs the handler.
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, StepResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: StepOutcome,
{
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, StepResult> {
        (self)(invocation)
            .map(StepOutcome::into_step_result)
            .boxed()
    }
}

/// The function run by an error step.
///
/// Implemented for every
/// `Fn(Invocation, BoxError) -> impl Future<Output: StepOutcome>`.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Runs the handler for `error`.
    fn call(&self, invocation: Invocation, error: BoxError) -> BoxFuture<'static, StepResult>;
}

impl<F, Fut> ErrorHandler for F
where
    F: Fn(Invocation, BoxError) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: StepOutcome,
{
    fn call(&self, invocation: Invocation, error: BoxError) -> BoxFuture<'static, StepResult> {
        (self)(invocation, error)
            .map(StepOutcome::into_step_result)
            .boxed()
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn Handler>;

/// A type-erased error handler.
pub type BoxedErrorHandler = Arc<dyn ErrorHandler>;

/// Convert a handler function into a boxed handler.
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(handler)
}

/// A handler that does nothing.
pub(crate) fn noop() -> BoxedHandler {
    into_handler(|_: Invocation| async {})
}
