//! Services: leaf routing nodes choosing a [`Descriptor`] from a header.
//!
//! A [`Service`] wraps the selected descriptor with service-wide steps:
//!
//! 1. if a descriptor was selected, or `always_exec_pre_descriptors` is set,
//!    the service pre-steps run (all of them, regardless of the done latch)
//!    followed by the selected descriptor,
//! 2. the service post-steps always run.
//!
//! Errors go to the service error step when one is set.

use std::collections::HashMap;
use std::fmt;

use tracing::{Instrument, Level, debug, error, span, warn};

use switchyard_core::{SetupResult, StatusCode, StepResult};

use crate::descriptor::{Descriptor, ErrorDescriptor, PostDescriptor, PreDescriptor};
use crate::handler::Invocation;
use crate::selector::{Selection, Selector};

/// A leaf routing node.
#[derive(Clone)]
pub struct Service {
    selector: Selector,
    descriptors: HashMap<String, Descriptor>,
    pre: Vec<PreDescriptor>,
    post: Vec<PostDescriptor>,
    error: Option<ErrorDescriptor>,
    always_exec_pre: bool,
}

impl Service {
    /// Creates a service selecting on the exact value of `field`.
    pub fn new(field: impl Into<String>) -> SetupResult<Self> {
        Ok(Self::from_selector(Selector::new(field)?))
    }

    /// Creates a service selecting on the first capture group of `pattern`.
    pub fn with_pattern(field: impl Into<String>, pattern: &str) -> SetupResult<Self> {
        Ok(Self::from_selector(Selector::with_pattern(field, pattern)?))
    }

    /// Creates a service from a prepared selector.
    pub fn from_selector(selector: Selector) -> Self {
        Self {
            selector,
            descriptors: HashMap::new(),
            pre: Vec::new(),
            post: Vec::new(),
            error: None,
            always_exec_pre: false,
        }
    }

    // ─── Builder ──────────────────────────────────────────────────────────────

    /// Registers `descriptor` under `marker`; `""` is the default entry.
    pub fn descriptor(mut self, marker: impl Into<String>, descriptor: Descriptor) -> Self {
        self.set_descriptor(marker, descriptor);
        self
    }

    /// Appends a service pre-step.
    pub fn pre(mut self, step: PreDescriptor) -> Self {
        self.pre.push(step);
        self
    }

    /// Appends a service post-step.
    pub fn post(mut self, step: PostDescriptor) -> Self {
        self.post.push(step);
        self
    }

    /// Sets the service error step.
    pub fn on_error(mut self, step: ErrorDescriptor) -> Self {
        self.error = Some(step);
        self
    }

    /// Runs the service pre-steps even when no descriptor is selected.
    pub fn always_exec_pre_descriptors(mut self, enabled: bool) -> Self {
        self.always_exec_pre = enabled;
        self
    }

    // ─── Setters ──────────────────────────────────────────────────────────────

    /// Registers or replaces the descriptor for `marker`.
    pub fn set_descriptor(&mut self, marker: impl Into<String>, descriptor: Descriptor) {
        self.descriptors.insert(marker.into(), descriptor);
    }

    /// Appends service pre-steps.
    pub fn add_pre_descriptors(&mut self, steps: impl IntoIterator<Item = PreDescriptor>) {
        self.pre.extend(steps);
    }

    /// Appends service post-steps.
    pub fn add_post_descriptors(&mut self, steps: impl IntoIterator<Item = PostDescriptor>) {
        self.post.extend(steps);
    }

    /// Sets or replaces the service error step.
    pub fn set_error_descriptor(&mut self, step: ErrorDescriptor) {
        self.error = Some(step);
    }

    /// Toggles [`always_exec_pre_descriptors`](Self::always_exec_pre_descriptors).
    pub fn set_always_exec_pre_descriptors(&mut self, enabled: bool) {
        self.always_exec_pre = enabled;
    }

    /// The selector of this service.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Number of registered descriptors.
    pub fn descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    // ─── Execution ────────────────────────────────────────────────────────────

    /// Handles one exchange.
    pub async fn handle(&self, invocation: Invocation) -> StepResult {
        let span = span!(
            Level::DEBUG,
            "service",
            field = %self.selector.field(),
            stream = invocation.exchange.id()
        );

        async {
            let descriptor = match self.select(&invocation) {
                Some(Resolution::Found(descriptor)) => Some(descriptor),
                Some(Resolution::Missing) => None,
                None => return Ok(()),
            };

            match self.run(descriptor, &invocation).await {
                Ok(()) => Ok(()),
                Err(err) => match &self.error {
                    Some(step) => step.handle(invocation.clone(), err).await,
                    None => Err(err),
                },
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, descriptor: Option<&Descriptor>, invocation: &Invocation) -> StepResult {
        if descriptor.is_some() || self.always_exec_pre {
            for step in &self.pre {
                step.handle(invocation.clone()).await?;
            }
            if let Some(descriptor) = descriptor {
                descriptor.handle(invocation).await?;
            }
        }

        for step in &self.post {
            step.handle(invocation.clone()).await?;
        }

        Ok(())
    }

    /// Resolves the descriptor, consuming the processed header on a pattern
    /// hit. Returns `None` when the header was rejected and answered.
    fn select(&self, invocation: &Invocation) -> Option<Resolution<'_>> {
        let field = self.selector.field();
        let value = invocation.context.processed_header(field).unwrap_or_default();

        match self.selector.select(&self.descriptors, &value) {
            Selection::Matched {
                target,
                marker,
                remainder,
            } => {
                debug!(%marker, "Descriptor selected");
                if let Some(remainder) = remainder {
                    invocation.context.set_processed_header(field, remainder);
                }
                Some(Resolution::Found(target))
            }
            Selection::Default(target) => {
                debug!(%value, "Default descriptor selected");
                Some(Resolution::Found(target))
            }
            Selection::Unmatched => {
                debug!(%value, "No descriptor for header value");
                Some(Resolution::Missing)
            }
            Selection::Rejected { value } => {
                reject(invocation, &self.selector, &value);
                None
            }
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut markers: Vec<_> = self.descriptors.keys().collect();
        markers.sort();
        f.debug_struct("Service")
            .field("selector", &self.selector)
            .field("descriptors", &markers)
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .field("error", &self.error.is_some())
            .field("always_exec_pre", &self.always_exec_pre)
            .finish()
    }
}

enum Resolution<'a> {
    Found(&'a Descriptor),
    Missing,
}

/// Answers an exchange whose selector header did not match the pattern.
pub(crate) fn reject(invocation: &Invocation, selector: &Selector, value: &str) {
    error!(
        field = %selector.field(),
        value,
        pattern = selector.pattern().map(|p| p.as_str()).unwrap_or_default(),
        "Selector header did not match the pattern"
    );
    let exchange = &invocation.exchange;
    if exchange.headers_sent() {
        return;
    }
    if let Err(e) = exchange.respond_status(StatusCode::INTERNAL_SERVER_ERROR) {
        warn!(error = %e, "Failed to answer rejected exchange");
    }
}
