//! Service managers: the inner nodes of a routing tree.
//!
//! A [`ServiceManager`] selects a child [`Processor`] (a [`Service`] or
//! another manager) from a processed header and delegates the exchange to
//! it. The first manager an exchange reaches promotes the connection's
//! session context into the exchange context; nested managers reuse it.
//!
//! For each exchange a manager:
//!
//! 1. announces its alternative service, if configured,
//! 2. applies its cross-origin settings to the exchange and answers preflight
//!    requests itself,
//! 3. promotes the context and records the query parameters of `:path`,
//! 4. selects a child and delegates, unless a response was already sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard_framework::{ServiceManager, Service, Descriptor};
//!
//! let root = ServiceManager::with_pattern(":path", "^/([a-z]+)")?
//!     .sub_manager("api", ServiceManager::with_pattern(":path", "^/([a-z]+)")?
//!         .service("users", users_service))
//!     .service("", static_files);
//!
//! root.handle(exchange, headers, flags, &session).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tracing::{Instrument, Level, debug, span, warn};

use switchyard_core::{
    BoxError, Exchange, Headers, Method, RouteContext, SetupResult, StepResult, StreamContext,
    StreamFlags, query,
};

use crate::cors::CorsConfig;
use crate::handler::Invocation;
use crate::selector::{Selection, Selector};
use crate::service::{Service, reject};

// ============================================================================
// Processor
// ============================================================================

/// A child of a [`ServiceManager`].
#[derive(Debug, Clone)]
pub enum Processor {
    /// A leaf node.
    Service(Arc<Service>),
    /// A nested manager.
    Manager(Arc<ServiceManager>),
}

impl Processor {
    /// Delegates an exchange whose context is already promoted.
    pub fn handle(
        &self,
        exchange: Exchange,
        headers: Arc<Headers>,
        flags: StreamFlags,
        context: StreamContext,
    ) -> BoxFuture<'_, StepResult> {
        match self {
            Self::Service(service) => {
                Box::pin(service.handle(Invocation::new(exchange, headers, flags, context)))
            }
            Self::Manager(manager) => Box::pin(manager.route(
                exchange,
                headers,
                flags,
                RouteContext::Stream(context),
            )),
        }
    }
}

impl From<Service> for Processor {
    fn from(service: Service) -> Self {
        Self::Service(Arc::new(service))
    }
}

impl From<ServiceManager> for Processor {
    fn from(manager: ServiceManager) -> Self {
        Self::Manager(Arc::new(manager))
    }
}

// ============================================================================
// ServiceManager
// ============================================================================

/// An inner routing node.
#[derive(Clone)]
pub struct ServiceManager {
    selector: Selector,
    processors: HashMap<String, Processor>,
    cors: Option<CorsConfig>,
    alt_svc: Option<String>,
}

impl ServiceManager {
    /// Creates a manager selecting on the exact value of `field`.
    pub fn new(field: impl Into<String>) -> SetupResult<Self> {
        Ok(Self::from_selector(Selector::new(field)?))
    }

    /// Creates a manager selecting on the first capture group of `pattern`.
    pub fn with_pattern(field: impl Into<String>, pattern: &str) -> SetupResult<Self> {
        Ok(Self::from_selector(Selector::with_pattern(field, pattern)?))
    }

    /// Creates a manager from a prepared selector.
    pub fn from_selector(selector: Selector) -> Self {
        Self {
            selector,
            processors: HashMap::new(),
            cors: None,
            alt_svc: None,
        }
    }

    // ─── Builder ──────────────────────────────────────────────────────────────

    /// Registers a service under `marker`; `""` is the default entry.
    pub fn service(mut self, marker: impl Into<String>, service: Service) -> Self {
        self.set_service(marker, service);
        self
    }

    /// Registers a nested manager under `marker`.
    pub fn sub_manager(mut self, marker: impl Into<String>, manager: ServiceManager) -> Self {
        self.set_sub_manager(marker, manager);
        self
    }

    /// Applies cross-origin settings to every exchange routed through here.
    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Announces `value` as alternative service on every exchange.
    pub fn with_alt_svc(mut self, value: impl Into<String>) -> Self {
        self.alt_svc = Some(value.into());
        self
    }

    // ─── Setters ──────────────────────────────────────────────────────────────

    /// Registers or replaces the service for `marker`.
    pub fn set_service(&mut self, marker: impl Into<String>, service: Service) {
        self.processors.insert(marker.into(), service.into());
    }

    /// Registers or replaces the nested manager for `marker`.
    pub fn set_sub_manager(&mut self, marker: impl Into<String>, manager: ServiceManager) {
        self.processors.insert(marker.into(), manager.into());
    }

    /// Registers or replaces any child for `marker`.
    pub fn set_processor(&mut self, marker: impl Into<String>, processor: Processor) {
        self.processors.insert(marker.into(), processor);
    }

    /// Enables the alternative service announcement, optionally with
    /// cross-origin settings.
    pub fn enable_alt_svc(&mut self, value: impl Into<String>, cors: Option<CorsConfig>) {
        self.alt_svc = Some(value.into());
        if cors.is_some() {
            self.cors = cors;
        }
    }

    /// Enables cross-origin settings.
    pub fn enable_cors(&mut self, cors: CorsConfig) {
        self.cors = Some(cors);
    }

    /// The selector of this manager.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Number of registered children.
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Wraps the manager into a [`tower::Service`].
    pub fn into_router(self) -> Router {
        Router::new(self)
    }

    // ─── Execution ────────────────────────────────────────────────────────────

    /// Routes one exchange.
    ///
    /// `context` is the connection's session context for a root manager, or
    /// an already promoted exchange context.
    pub async fn handle(
        &self,
        exchange: Exchange,
        headers: Arc<Headers>,
        flags: StreamFlags,
        context: impl Into<RouteContext>,
    ) -> StepResult {
        self.route(exchange, headers, flags, context.into()).await
    }

    async fn route(
        &self,
        exchange: Exchange,
        headers: Arc<Headers>,
        flags: StreamFlags,
        context: RouteContext,
    ) -> StepResult {
        let span = span!(
            Level::DEBUG,
            "route",
            field = %self.selector.field(),
            stream = exchange.id()
        );

        self.dispatch(exchange, headers, flags, context)
            .instrument(span)
            .await
    }

    async fn dispatch(
        &self,
        exchange: Exchange,
        headers: Arc<Headers>,
        flags: StreamFlags,
        context: RouteContext,
    ) -> StepResult {
        if let Some(alt_svc) = &self.alt_svc
            && let Err(e) = exchange.announce_alt_svc(alt_svc)
        {
            warn!(error = %e, "Failed to announce alternative service");
        }

        let exchange = match &self.cors {
            Some(cors) => {
                let exchange = cors.apply(&exchange);
                if headers.method() == Some(Method::OPTIONS) {
                    if !exchange.headers_sent() {
                        CorsConfig::respond_preflight(&exchange)?;
                    }
                    return Ok(());
                }
                exchange
            }
            None => exchange,
        };

        let context = context.into_stream(&headers);
        context.set_search_params(headers.path().map(query::search_params).unwrap_or_default());

        match self.select(&exchange, &headers, flags, &context) {
            Some(processor) if !exchange.headers_sent() => {
                processor.handle(exchange, headers, flags, context).await
            }
            _ => {
                warn!(
                    value = %context.processed_header(self.selector.field()).unwrap_or_default(),
                    "No stream processor could be selected"
                );
                Ok(())
            }
        }
    }

    fn select(
        &self,
        exchange: &Exchange,
        headers: &Arc<Headers>,
        flags: StreamFlags,
        context: &StreamContext,
    ) -> Option<&Processor> {
        let field = self.selector.field();
        let value = context.processed_header(field).unwrap_or_default();

        match self.selector.select(&self.processors, &value) {
            Selection::Matched {
                target,
                marker,
                remainder,
            } => {
                debug!(%marker, "Processor selected");
                if let Some(remainder) = remainder {
                    context.set_processed_header(field, remainder);
                }
                Some(target)
            }
            Selection::Default(target) => {
                debug!(%value, "Default processor selected");
                Some(target)
            }
            Selection::Unmatched => None,
            Selection::Rejected { value } => {
                let invocation =
                    Invocation::new(exchange.clone(), headers.clone(), flags, context.clone());
                reject(&invocation, &self.selector, &value);
                None
            }
        }
    }
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut markers: Vec<_> = self.processors.keys().collect();
        markers.sort();
        f.debug_struct("ServiceManager")
            .field("selector", &self.selector)
            .field("processors", &markers)
            .field("cors", &self.cors)
            .field("alt_svc", &self.alt_svc)
            .finish()
    }
}

// ============================================================================
// Tower Integration
// ============================================================================

/// One exchange dispatched through a [`Router`].
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The exchange.
    pub exchange: Exchange,
    /// The raw inbound headers.
    pub headers: Arc<Headers>,
    /// Transport flags.
    pub flags: StreamFlags,
    /// The connection's session context, or a promoted exchange context.
    pub context: RouteContext,
}

/// A routing tree exposed as a [`tower::Service`].
///
/// Cloning is cheap; all clones share the same tree.
#[derive(Debug, Clone)]
pub struct Router {
    root: Arc<ServiceManager>,
}

impl Router {
    /// Wraps `root`.
    pub fn new(root: ServiceManager) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// The root manager.
    pub fn root(&self) -> &ServiceManager {
        &self.root
    }
}

impl From<Arc<ServiceManager>> for Router {
    fn from(root: Arc<ServiceManager>) -> Self {
        Self { root }
    }
}

impl tower::Service<Dispatch> for Router {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, StepResult>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Dispatch) -> Self::Future {
        let root = Arc::clone(&self.root);

        Box::pin(async move {
            root.route(
                request.exchange,
                request.headers,
                request.flags,
                request.context,
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use switchyard_core::{MemoryExchange, SessionContext, StatusCode, names};
    use tower::ServiceExt;

    use crate::descriptor::Descriptor;

    fn responding_service(status: StatusCode) -> Service {
        Service::new("x-action").unwrap().descriptor(
            "",
            Descriptor::new(move |inv: Invocation| async move {
                inv.exchange.respond_status(status)
            }),
        )
    }

    #[tokio::test]
    async fn preflight_is_answered_by_manager() {
        let root = ServiceManager::new("x-service")
            .unwrap()
            .with_cors(CorsConfig::default())
            .service("", responding_service(StatusCode::NOT_FOUND));
        let stream = MemoryExchange::new(1);
        let headers = Headers::from([(":method", "OPTIONS"), (":path", "/")]);

        root.handle(
            Exchange::new(stream.clone()),
            Arc::new(headers),
            0,
            &SessionContext::default(),
        )
        .await
        .unwrap();

        let head = stream.response().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers.get(names::ACCESS_CONTROL_ALLOW_METHODS), Some("*"));
        assert_eq!(head.headers.get(names::ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
        assert_eq!(stream.response_count(), 1);
    }

    #[tokio::test]
    async fn cors_headers_reach_nested_responses() {
        let root = ServiceManager::new("x-service")
            .unwrap()
            .with_cors(CorsConfig::allow_origin("https://a.example"))
            .service("", responding_service(StatusCode::ACCEPTED));
        let stream = MemoryExchange::new(1);

        root.handle(
            Exchange::new(stream.clone()),
            Arc::new(Headers::from([(":method", "GET")])),
            0,
            &SessionContext::default(),
        )
        .await
        .unwrap();

        let head = stream.response().unwrap();
        assert_eq!(head.status, StatusCode::ACCEPTED);
        assert_eq!(
            head.headers.get(names::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("https://a.example")
        );
    }

    #[tokio::test]
    async fn alt_svc_is_announced() {
        let root = ServiceManager::new("x-service")
            .unwrap()
            .with_alt_svc("h3=\":443\"");
        let stream = MemoryExchange::new(1);

        root.handle(
            Exchange::new(stream.clone()),
            Arc::new(Headers::new()),
            0,
            &SessionContext::default(),
        )
        .await
        .unwrap();

        assert_eq!(stream.alt_svc(), ["h3=\":443\""]);
        // nothing selected, nothing answered
        assert_eq!(stream.response_count(), 0);
    }

    #[tokio::test]
    async fn search_params_are_recorded() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let root = ServiceManager::new("x-service").unwrap().service(
            "",
            Service::new("x-action").unwrap().descriptor(
                "",
                Descriptor::new(move |inv: Invocation| {
                    let seen = seen_clone.clone();
                    async move {
                        *seen.lock() = Some(inv.context.search_params());
                    }
                }),
            ),
        );

        root.handle(
            Exchange::new(MemoryExchange::new(1)),
            Arc::new(Headers::from([(":path", "/foo?a=1&a=2&b=x")])),
            0,
            &SessionContext::default(),
        )
        .await
        .unwrap();

        let params = seen.lock().clone().unwrap();
        assert_eq!(params["a"], "2");
        assert_eq!(params["b"], "x");
    }

    #[tokio::test]
    async fn already_answered_exchange_is_not_delegated() {
        let delegated = Arc::new(Mutex::new(false));
        let delegated_clone = delegated.clone();
        let root = ServiceManager::new("x-service").unwrap().service(
            "",
            Service::new("x-action").unwrap().descriptor(
                "",
                Descriptor::new(move |_: Invocation| {
                    let delegated = delegated_clone.clone();
                    async move { *delegated.lock() = true }
                }),
            ),
        );
        let stream = MemoryExchange::new(1);
        let exchange = Exchange::new(stream.clone());
        exchange.respond_status(StatusCode::NO_CONTENT).unwrap();

        root.handle(exchange, Arc::new(Headers::new()), 0, &SessionContext::default())
            .await
            .unwrap();

        assert!(!*delegated.lock());
    }

    #[tokio::test]
    async fn router_is_a_tower_service() {
        let router = ServiceManager::new("x-service")
            .unwrap()
            .service("", responding_service(StatusCode::OK))
            .into_router();
        let stream = MemoryExchange::new(9);

        router
            .oneshot(Dispatch {
                exchange: Exchange::new(stream.clone()),
                headers: Arc::new(Headers::new()),
                flags: 0,
                context: SessionContext::default().into(),
            })
            .await
            .unwrap();

        assert_eq!(stream.status(), Some(StatusCode::OK));
    }

    #[test]
    fn router_is_always_ready() {
        let mut router = ServiceManager::new("x-service").unwrap().into_router();
        let mut ready = tokio_test::task::spawn(ServiceExt::<Dispatch>::ready(&mut router));

        tokio_test::assert_ready_ok!(ready.poll());
    }
}
