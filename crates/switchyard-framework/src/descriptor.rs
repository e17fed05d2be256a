//! Descriptors: the processing pipeline of a single route.
//!
//! A [`Descriptor`] runs, in order:
//!
//! 1. its pre-steps, skipping the remaining ones as soon as the exchange
//!    context is marked done,
//! 2. its main handler (always, even when done),
//! 3. its post-steps (always).
//!
//! Any error raised along the way is handed to the error step when one is
//! set, and propagated to the caller otherwise.
//!
//! Step roles are encoded in the type: a [`PreDescriptor`] cannot be
//! registered where a [`PostDescriptor`] is expected.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard_framework::{Descriptor, PreDescriptor, PostDescriptor, Invocation};
//!
//! let descriptor = Descriptor::new(|inv: Invocation| async move {
//!     inv.exchange.respond_status(StatusCode::OK)
//! })
//! .pre(PreDescriptor::new(|inv: Invocation| async move {
//!     inv.context.set("user", "alice");
//! }))
//! .post(PostDescriptor::new(|_: Invocation| async {}));
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use tracing::{debug, trace};

use switchyard_core::{BoxError, StepResult};

use crate::handler::{
    BoxedErrorHandler, BoxedHandler, ErrorHandler, Handler, Invocation, into_handler, noop,
};

// ============================================================================
// Step roles
// ============================================================================

/// Marker for the role a step plays in a pipeline.
pub trait StepKind: Send + Sync + 'static {
    /// Label used in logs.
    const LABEL: &'static str;
}

/// Runs before the main handler; skipped once the exchange is done.
#[derive(Debug)]
pub enum Pre {}

/// Runs after the main handler; never skipped.
#[derive(Debug)]
pub enum Post {}

impl StepKind for Pre {
    const LABEL: &'static str = "pre";
}

impl StepKind for Post {
    const LABEL: &'static str = "post";
}

// ============================================================================
// StepDescriptor
// ============================================================================

/// A single pre- or post-step.
pub struct StepDescriptor<K: StepKind> {
    handler: BoxedHandler,
    name: Option<Cow<'static, str>>,
    _kind: PhantomData<fn() -> K>,
}

/// A step run before a main handler.
pub type PreDescriptor = StepDescriptor<Pre>;

/// A step run after a main handler.
pub type PostDescriptor = StepDescriptor<Post>;

impl<K: StepKind> StepDescriptor<K> {
    /// Creates a step running `handler`.
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            handler: into_handler(handler),
            name: None,
            _kind: PhantomData,
        }
    }

    /// Names the step for logging.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the handler.
    pub fn set_handler<H: Handler>(&mut self, handler: H) {
        self.handler = into_handler(handler);
    }

    /// The name given with [`named`](Self::named).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Runs the step.
    pub fn handle(&self, invocation: Invocation) -> BoxFuture<'static, StepResult> {
        trace!(
            kind = K::LABEL,
            step = self.name().unwrap_or("<anonymous>"),
            "Running step"
        );
        self.handler.call(invocation)
    }
}

impl<K: StepKind> Default for StepDescriptor<K> {
    fn default() -> Self {
        Self {
            handler: noop(),
            name: None,
            _kind: PhantomData,
        }
    }
}

impl<K: StepKind> Clone for StepDescriptor<K> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            name: self.name.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: StepKind> fmt::Debug for StepDescriptor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("kind", &K::LABEL)
            .field("name", &self.name)
            .finish()
    }
}

// ============================================================================
// ErrorDescriptor
// ============================================================================

/// The step handling an error raised by a pipeline.
///
/// When an error step is set the original error is swallowed; an error raised
/// by the error step itself propagates.
#[derive(Clone)]
pub struct ErrorDescriptor {
    handler: BoxedErrorHandler,
    name: Option<Cow<'static, str>>,
}

impl ErrorDescriptor {
    /// Creates an error step running `handler`.
    pub fn new<H: ErrorHandler>(handler: H) -> Self {
        Self {
            handler: std::sync::Arc::new(handler),
            name: None,
        }
    }

    /// Names the step for logging.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the handler.
    pub fn set_handler<H: ErrorHandler>(&mut self, handler: H) {
        self.handler = std::sync::Arc::new(handler);
    }

    /// The name given with [`named`](Self::named).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Runs the step for `error`.
    pub fn handle(
        &self,
        invocation: Invocation,
        error: BoxError,
    ) -> BoxFuture<'static, StepResult> {
        debug!(
            step = self.name().unwrap_or("<anonymous>"),
            error = %error,
            "Handing error to error step"
        );
        self.handler.call(invocation, error)
    }
}

impl fmt::Debug for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// A main handler wrapped by pre-steps, post-steps and an optional error step.
#[derive(Clone)]
pub struct Descriptor {
    handler: BoxedHandler,
    pre: Vec<PreDescriptor>,
    post: Vec<PostDescriptor>,
    error: Option<ErrorDescriptor>,
}

impl Descriptor {
    /// Creates a descriptor with `handler` as its main step.
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            handler: into_handler(handler),
            ..Self::default()
        }
    }

    // ─── Builder ──────────────────────────────────────────────────────────────

    /// Appends a pre-step.
    pub fn pre(mut self, step: PreDescriptor) -> Self {
        self.pre.push(step);
        self
    }

    /// Appends a post-step.
    pub fn post(mut self, step: PostDescriptor) -> Self {
        self.post.push(step);
        self
    }

    /// Sets the error step.
    pub fn on_error(mut self, step: ErrorDescriptor) -> Self {
        self.error = Some(step);
        self
    }

    // ─── Setters ──────────────────────────────────────────────────────────────

    /// Replaces the main handler.
    pub fn set_handler<H: Handler>(&mut self, handler: H) {
        self.handler = into_handler(handler);
    }

    /// Appends pre-steps, preserving their order.
    pub fn add_pre_descriptors(&mut self, steps: impl IntoIterator<Item = PreDescriptor>) {
        self.pre.extend(steps);
    }

    /// Appends post-steps, preserving their order.
    pub fn add_post_descriptors(&mut self, steps: impl IntoIterator<Item = PostDescriptor>) {
        self.post.extend(steps);
    }

    /// Sets or replaces the error step.
    pub fn set_error_descriptor(&mut self, step: ErrorDescriptor) {
        self.error = Some(step);
    }

    /// Number of pre-steps.
    pub fn pre_count(&self) -> usize {
        self.pre.len()
    }

    /// Number of post-steps.
    pub fn post_count(&self) -> usize {
        self.post.len()
    }

    /// Returns `true` if an error step is set.
    pub fn has_error_descriptor(&self) -> bool {
        self.error.is_some()
    }

    // ─── Execution ────────────────────────────────────────────────────────────

    /// Runs the pipeline for one exchange.
    pub async fn handle(&self, invocation: &Invocation) -> StepResult {
        match self.run(invocation).await {
            Ok(()) => Ok(()),
            Err(error) => match &self.error {
                Some(step) => step.handle(invocation.clone(), error).await,
                None => Err(error),
            },
        }
    }

    async fn run(&self, invocation: &Invocation) -> StepResult {
        for (index, step) in self.pre.iter().enumerate() {
            if invocation.context.done() {
                trace!(
                    skipped = self.pre.len() - index,
                    "Exchange done, skipping remaining pre-steps"
                );
                break;
            }
            step.handle(invocation.clone()).await?;
        }

        self.handler.call(invocation.clone()).await?;

        for step in &self.post {
            step.handle(invocation.clone()).await?;
        }

        Ok(())
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            handler: noop(),
            pre: Vec::new(),
            post: Vec::new(),
            error: None,
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("pre", &self.pre)
            .field("post", &self.post)
            .field("error", &self.error)
            .finish()
    }
}
