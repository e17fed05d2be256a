//! Cross-origin response headers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use switchyard_core::{
    Exchange, Headers, RespondOptions, ResponseHead, StatusCode, TransportResult, names,
};

/// Cross-origin settings of a routing node.
///
/// Every response sent below the node carries the four
/// `access-control-allow-*` headers built from these settings.
///
/// ```toml
/// [cors]
/// allow-origin = "https://app.example"
/// allow-credentials = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CorsConfig {
    /// Value of `access-control-allow-origin`.
    pub allow_origin: String,
    /// Value of `access-control-allow-credentials`.
    pub allow_credentials: bool,
    /// Value of `access-control-allow-headers`.
    pub allow_headers: String,
    /// Value of `access-control-allow-methods`.
    pub allow_methods: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_credentials: false,
            allow_headers: "*".to_string(),
            allow_methods: "*".to_string(),
        }
    }
}

impl CorsConfig {
    /// Settings allowing `origin`, everything else at its default.
    pub fn allow_origin(origin: impl Into<String>) -> Self {
        Self {
            allow_origin: origin.into(),
            ..Self::default()
        }
    }

    /// The headers added to every response.
    pub fn headers(&self) -> Headers {
        Headers::new()
            .with(names::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.as_str())
            .with(
                names::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                self.allow_credentials.to_string(),
            )
            .with(names::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.as_str())
            .with(names::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.as_str())
    }

    /// Returns `exchange` with its responder wrapped to add the cross-origin
    /// headers. The headers win over ones with the same name set by handlers.
    pub fn apply(&self, exchange: &Exchange) -> Exchange {
        exchange.with_header_patch(self.headers())
    }

    /// Answers a preflight request on an exchange returned by
    /// [`apply`](Self::apply).
    pub fn respond_preflight(exchange: &Exchange) -> TransportResult<()> {
        debug!(stream = exchange.id(), "Answering preflight request");
        let head = ResponseHead::new(StatusCode::OK)
            .header(names::ACCESS_CONTROL_ALLOW_METHODS, "*")
            .header(names::ACCESS_CONTROL_ALLOW_HEADERS, "*");
        exchange.respond(head, RespondOptions::END_STREAM)
    }
}
