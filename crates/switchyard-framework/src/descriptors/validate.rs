use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use switchyard_core::{
    BoxError, Headers, RespondOptions, ResponseHead, StatusCode, StreamContext, json, names,
};

use crate::descriptor::PreDescriptor;
use crate::handler::Invocation;

/// Outcome of a [`Validator`] run.
///
/// Validation failed when `error` is set. The whole result is sent back to
/// the client on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Why validation failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<switchyard_core::Value>,
    /// The validated value, when the validator produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<switchyard_core::Value>,
}

impl ValidationResult {
    /// A passing result.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A failing result carrying `error`.
    pub fn failed(error: impl Into<switchyard_core::Value>) -> Self {
        Self {
            error: Some(error.into()),
            value: None,
        }
    }

    /// Returns `true` if validation failed.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Checks an exchange before its main handler runs.
#[async_trait]
pub trait Validator: Send + Sync + 'static {
    /// Validates the exchange described by `headers` and `context`.
    async fn validate(&self, headers: &Headers, context: &StreamContext) -> ValidationResult;
}

/// A pre-step running `validator`, answering `422 Unprocessable Entity` on
/// failure.
pub fn validate_pre<V: Validator>(validator: V) -> PreDescriptor {
    validate_pre_with_status(validator, StatusCode::UNPROCESSABLE_ENTITY)
}

/// Like [`validate_pre`] with a custom failure status.
///
/// On failure the step answers with a JSON body `{"validationResult": ...}`
/// and marks the exchange done, so the remaining pre-steps are skipped.
pub fn validate_pre_with_status<V: Validator>(validator: V, status: StatusCode) -> PreDescriptor {
    let validator = Arc::new(validator);

    PreDescriptor::new(move |invocation: Invocation| {
        let validator = Arc::clone(&validator);
        async move {
            let result = validator
                .validate(&invocation.headers, &invocation.context)
                .await;
            if !result.is_failure() {
                return Ok(());
            }

            debug!(stream = invocation.exchange.id(), %status, "Validation failed");
            let body = serde_json::to_vec(&json!({ "validationResult": result }))?;
            invocation.exchange.respond(
                ResponseHead::new(status).header(names::CONTENT_TYPE, "application/json"),
                RespondOptions::KEEP_OPEN,
            )?;
            invocation.exchange.write(body).await?;
            invocation.exchange.end()?;
            invocation.context.mark_done();
            Ok::<(), BoxError>(())
        }
    })
    .named("validate")
}

#[cfg(test)]
mod tests {
    use super::*;

    use switchyard_core::{Exchange, MemoryExchange, SessionContext, Value};

    struct RequireUser;

    #[async_trait]
    impl Validator for RequireUser {
        /// Validates the exchange described by `headers` and `context`.
    async fn validate(&self, headers: &Headers, _: &StreamContext) -> ValidationResult {
            match headers.get("x-user") {
                Some(user) => ValidationResult {
                    error: None,
                    value: Some(user.into()),
                },
                None => ValidationResult::failed("x-user is required"),
            }
        }
    }

    fn invocation(stream: Arc<MemoryExchange>, headers: Headers) -> Invocation {
        let context = StreamContext::promote(&SessionContext::default(), &headers);
        Invocation::new(Exchange::new(stream), Arc::new(headers), 0, context)
    }

    #[tokio::test]
    async fn failure_answers_and_marks_done() {
        let stream = MemoryExchange::new(1);
        let inv = invocation(stream.clone(), Headers::new());

        validate_pre(RequireUser).handle(inv.clone()).await.unwrap();

        let head = stream.response().unwrap();
        assert_eq!(head.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(head.headers.get(names::CONTENT_TYPE), Some("application/json"));
        let body: Value = serde_json::from_slice(&stream.body()).unwrap();
        assert_eq!(
            body,
            json!({ "validationResult": { "error": "x-user is required" } })
        );
        assert!(stream.is_ended());
        assert!(inv.context.done());
    }

    #[tokio::test]
    async fn success_passes_through() {
        let stream = MemoryExchange::new(1);
        let inv = invocation(stream.clone(), Headers::from([("x-user", "alice")]));

        validate_pre_with_status(RequireUser, StatusCode::BAD_REQUEST)
            .handle(inv.clone())
            .await
            .unwrap();

        assert_eq!(stream.response_count(), 0);
        assert!(!inv.context.done());
    }
}
