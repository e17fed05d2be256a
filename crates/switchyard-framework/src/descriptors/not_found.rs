use switchyard_core::{StatusCode, TransportResult};

use crate::descriptor::{PostDescriptor, PreDescriptor};
use crate::handler::Invocation;

async fn respond_not_found(invocation: Invocation) -> TransportResult<()> {
    if invocation.exchange.headers_sent() || invocation.context.done() {
        return Ok(());
    }
    invocation.exchange.respond_status(StatusCode::NOT_FOUND)
}

/// A pre-step answering `404 Not Found`.
pub fn not_found_pre() -> PreDescriptor {
    PreDescriptor::new(respond_not_found).named("not_found")
}

/// A post-step answering `404 Not Found` when nothing else answered.
pub fn not_found_post() -> PostDescriptor {
    PostDescriptor::new(respond_not_found).named("not_found")
}
