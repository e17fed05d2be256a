use tracing::{error, warn};

use switchyard_core::{BoxError, Exchange, StatusCode};

use crate::descriptor::ErrorDescriptor;
use crate::handler::Invocation;

/// An error step logging the error and failing the exchange with
/// `500 Internal Server Error`.
pub fn general_error() -> ErrorDescriptor {
    ErrorDescriptor::new(|invocation: Invocation, err: BoxError| async move {
        error!(
            stream = invocation.exchange.id(),
            error = %err,
            "Error occurred during exchange processing"
        );
        terminate_with_server_error(&invocation.exchange);
    })
    .named("general_error")
}

/// Responds `500` if nothing was sent yet, then ends the stream if it is
/// still writable. Transport failures are logged, not returned.
pub fn terminate_with_server_error(exchange: &Exchange) {
    if !exchange.headers_sent()
        && let Err(e) = exchange.respond_status(StatusCode::INTERNAL_SERVER_ERROR)
    {
        warn!(stream = exchange.id(), error = %e, "Failed to send error response");
    }

    if !exchange.writable_ended()
        && let Err(e) = exchange.end()
    {
        warn!(stream = exchange.id(), error = %e, "Failed to end stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use switchyard_core::{
        Headers, MemoryExchange, RespondOptions, ResponseHead, SessionContext, StreamContext,
    };

    fn invocation(stream: Arc<MemoryExchange>) -> Invocation {
        let headers = Headers::new();
        let context = StreamContext::promote(&SessionContext::default(), &headers);
        Invocation::new(Exchange::new(stream), Arc::new(headers), 0, context)
    }

    #[tokio::test]
    async fn answers_500_and_swallows() {
        let stream = MemoryExchange::new(1);

        general_error()
            .handle(invocation(stream.clone()), "broken".into())
            .await
            .unwrap();

        assert_eq!(stream.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(stream.is_ended());
    }

    #[tokio::test]
    async fn ends_partially_answered_stream() {
        let stream = MemoryExchange::new(1);
        let inv = invocation(stream.clone());
        inv.exchange
            .respond(ResponseHead::new(StatusCode::OK), RespondOptions::KEEP_OPEN)
            .unwrap();

        general_error().handle(inv, "late".into()).await.unwrap();

        assert_eq!(stream.status(), Some(StatusCode::OK));
        assert_eq!(stream.response_count(), 1);
        assert!(stream.is_ended());
    }
}
