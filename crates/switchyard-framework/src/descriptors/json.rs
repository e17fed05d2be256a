use tracing::{debug, error};

use switchyard_core::{Value, names};

use crate::descriptor::PreDescriptor;
use crate::error::{BodyError, BodyResult};
use crate::handler::Invocation;

/// Context key holding the request body as text.
pub const RAW_BODY_KEY: &str = "rawBody";
/// Context key holding the parsed request body.
pub const BODY_KEY: &str = "body";

const APPLICATION_JSON: &str = "application/json";

/// A pre-step parsing a JSON request body into the context.
///
/// Runs only for readable exchanges declaring `content-type:
/// application/json` that are not done yet. The text is stored under
/// [`RAW_BODY_KEY`] even when it fails to parse; the parse error aborts the
/// pipeline.
pub fn json_pre() -> PreDescriptor {
    PreDescriptor::new(read_json_body).named("json")
}

/// The handler behind [`json_pre`].
pub async fn read_json_body(invocation: Invocation) -> BodyResult<()> {
    let Invocation {
        exchange,
        headers,
        context,
        ..
    } = invocation;

    if !exchange.readable() || context.done() || !is_json(headers.get(names::CONTENT_TYPE)) {
        return Ok(());
    }

    let raw = exchange.read_to_end().await?;
    let raw = String::from_utf8(raw.to_vec())?;
    debug!(stream = exchange.id(), bytes = raw.len(), "Read JSON body");
    context.set(RAW_BODY_KEY, raw.as_str());

    match serde_json::from_str::<Value>(&raw) {
        Ok(body) => {
            context.set(BODY_KEY, body);
            Ok(())
        }
        Err(e) => {
            error!(stream = exchange.id(), error = %e, "Couldn't parse the JSON body");
            Err(BodyError::Json(e))
        }
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(APPLICATION_JSON))
}
