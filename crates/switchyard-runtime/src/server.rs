//! The server wrapper sitting between a transport and a routing tree.
//!
//! A transport reports three kinds of events: a session opened, an exchange
//! opened on a session, a session closed. [`Server`] turns each into the
//! matching routing call and applies the policy for errors nothing in the
//! tree recovered from.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchyard_runtime::Server;
//!
//! // Loads switchyard.toml from the current directory, if any
//! let server = Server::builder().profile("production").build(root)?;
//!
//! let session = server.on_session_open(ContextData::new());
//! server.spawn_exchange(stream, headers, flags, &session);
//! // ...
//! server.on_session_close(&session);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::{Instrument, Level, debug, error, info, span};

use switchyard_core::{ContextData, Exchange, ExchangeStream, Headers, SessionContext, StreamFlags};
use switchyard_framework::descriptors::terminate_with_server_error;
use switchyard_framework::{Dispatch, Router, ServiceManager};

use crate::config::{ConfigLoader, SwitchyardConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

const EVENT_CAPACITY: usize = 256;

/// A lifecycle notification published by a [`Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A transport session was opened.
    SessionOpened { session: u64 },
    /// A transport session was closed.
    SessionClosed { session: u64 },
    /// An exchange ended with an error no routing node recovered from.
    ExchangeFailed {
        session: u64,
        stream: u32,
        error: String,
    },
}

/// Counters describing the work a server has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Sessions currently open.
    pub active_sessions: usize,
    /// Exchanges dispatched since start.
    pub exchanges: u64,
    /// Exchanges that ended with an unrecovered error.
    pub failed_exchanges: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sessions: AtomicUsize,
    exchanges: AtomicU64,
    failed: AtomicU64,
}

/// Dispatches transport events into a routing tree.
///
/// Cloning is cheap; clones share the tree, the counters and the event
/// channel.
#[derive(Debug, Clone)]
pub struct Server {
    router: Router,
    config: Arc<SwitchyardConfig>,
    events: broadcast::Sender<ServerEvent>,
    counters: Arc<Counters>,
}

impl Server {
    /// Creates a server with default configuration. Logging is left alone.
    pub fn new(root: ServiceManager) -> Self {
        Self::with_router(root.into_router(), SwitchyardConfig::default())
    }

    /// Creates a server builder loading configuration from files and the
    /// environment.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Creates a server from configuration.
    ///
    /// Validates the configuration, initializes logging and applies the
    /// configured cross-origin settings and alternative service to `root`.
    pub fn from_config(config: &SwitchyardConfig, mut root: ServiceManager) -> RuntimeResult<Self> {
        validate_config(config)?;
        logging::init_from_config(&config.logging);

        if let Some(cors) = &config.cors {
            root.enable_cors(cors.clone());
        }
        if let Some(alt_svc) = &config.server.alt_svc {
            root.enable_alt_svc(alt_svc.clone(), None);
        }

        info!(
            host = %config.server.host,
            port = config.server.port,
            cors = config.cors.is_some(),
            log_level = %config.logging.level,
            "Server initialized from configuration"
        );

        Ok(Self::with_router(root.into_router(), config.clone()))
    }

    fn with_router(router: Router, config: SwitchyardConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            router,
            config: Arc::new(config),
            events,
            counters: Arc::default(),
        }
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    /// Returns the configuration.
    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    /// Returns the routing tree.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Subscribes to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Number of sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.counters.sessions.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            active_sessions: self.active_sessions(),
            exchanges: self.counters.exchanges.load(Ordering::SeqCst),
            failed_exchanges: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    // ─── Transport events ─────────────────────────────────────────────────────

    /// Creates the context for a new transport session.
    pub fn on_session_open(&self, initial: ContextData) -> SessionContext {
        let session = SessionContext::new(initial);
        let active = self.counters.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(session = session.id(), active, "Session opened");
        self.publish(ServerEvent::SessionOpened {
            session: session.id(),
        });
        session
    }

    /// Records that a transport session closed.
    pub fn on_session_close(&self, session: &SessionContext) {
        let previous = self
            .counters
            .sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_default();
        debug!(
            session = session.id(),
            active = previous.saturating_sub(1),
            "Session closed"
        );
        self.publish(ServerEvent::SessionClosed {
            session: session.id(),
        });
    }

    /// Routes one exchange to completion.
    ///
    /// An error reaching this point fails the exchange with `500` if nothing
    /// was sent and ends the stream if it is still writable. It is logged and
    /// published, not returned.
    pub async fn on_exchange_open(
        &self,
        stream: Arc<dyn ExchangeStream>,
        headers: Headers,
        flags: StreamFlags,
        session: &SessionContext,
    ) {
        let exchange = Exchange::new(stream);
        let span = span!(
            Level::DEBUG,
            "dispatch",
            session = session.id(),
            stream = exchange.id(),
            path = headers.path().unwrap_or_default()
        );
        self.counters.exchanges.fetch_add(1, Ordering::SeqCst);

        let request = Dispatch {
            exchange: exchange.clone(),
            headers: Arc::new(headers),
            flags,
            context: session.into(),
        };

        let result = self.router.clone().oneshot(request).instrument(span).await;

        if let Err(e) = result {
            error!(
                session = session.id(),
                stream = exchange.id(),
                error = %e,
                "Unrecovered error while processing exchange"
            );
            terminate_with_server_error(&exchange);
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            self.publish(ServerEvent::ExchangeFailed {
                session: session.id(),
                stream: exchange.id(),
                error: e.to_string(),
            });
        }
    }

    /// Routes one exchange on its own task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_exchange(
        &self,
        stream: Arc<dyn ExchangeStream>,
        headers: Headers,
        flags: StreamFlags,
        session: &SessionContext,
    ) -> JoinHandle<()> {
        let server = self.clone();
        let session = session.clone();
        tokio::spawn(async move {
            server
                .on_exchange_open(stream, headers, flags, &session)
                .await
        })
    }

    fn publish(&self, event: ServerEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }
}

// =============================================================================
// ServerBuilder
// =============================================================================

/// Builder for creating a [`Server`] from layered configuration.
///
/// ```rust,ignore
/// let server = Server::builder()
///     .config_file("config/switchyard.toml")
///     .profile("production")
///     .build(root)?;
/// ```
pub struct ServerBuilder {
    config_loader: ConfigLoader,
}

impl ServerBuilder {
    /// Creates a builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: SwitchyardConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the server around `root`.
    pub fn build(self, root: ServiceManager) -> RuntimeResult<Server> {
        let config = self.config_loader.load()?;
        Server::from_config(&config, root)
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use switchyard_core::{BoxError, MemoryExchange, RespondOptions, ResponseHead, StatusCode};
    use switchyard_framework::{CorsConfig, Descriptor, Invocation, Service};

    fn tree(handler: Descriptor) -> ServiceManager {
        ServiceManager::new("x-service")
            .unwrap()
            .service("", Service::new("x-action").unwrap().descriptor("", handler))
    }

    fn failing() -> Descriptor {
        Descriptor::new(|_: Invocation| async { Err::<(), BoxError>("boom".into()) })
    }

    #[tokio::test]
    async fn session_lifecycle_is_counted_and_published() {
        let server = Server::new(tree(Descriptor::default()));
        let mut events = server.subscribe();

        let first = server.on_session_open(ContextData::new());
        let second = server.on_session_open(ContextData::new());
        assert_eq!(server.active_sessions(), 2);

        server.on_session_close(&first);
        server.on_session_close(&second);
        server.on_session_close(&second);
        assert_eq!(server.active_sessions(), 0);

        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::SessionOpened { session: first.id() }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::SessionOpened {
                session: second.id()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::SessionClosed { session: first.id() }
        );
    }

    #[tokio::test]
    async fn initial_session_data_is_visible_to_handlers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let server = Server::new(tree(Descriptor::new(move |inv: Invocation| {
            let seen = seen_clone.clone();
            async move {
                if let Some(user) = inv.context.session_data().get("user") {
                    seen.store(user.as_u64().unwrap_or_default() as usize, Ordering::SeqCst);
                }
            }
        })));

        let mut initial = ContextData::new();
        initial.insert("user".into(), 7.into());
        let session = server.on_session_open(initial);

        server
            .on_exchange_open(MemoryExchange::new(1), Headers::new(), 0, &session)
            .await;

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn unrecovered_error_answers_500() {
        let server = Server::new(tree(failing()));
        let mut events = server.subscribe();
        let session = server.on_session_open(ContextData::new());
        let stream = MemoryExchange::new(3);

        server
            .on_exchange_open(stream.clone(), Headers::new(), 0, &session)
            .await;

        assert_eq!(stream.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(stream.is_ended());
        assert_eq!(server.stats().failed_exchanges, 1);

        let _opened = events.recv().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::ExchangeFailed {
                session: session.id(),
                stream: 3,
                error: "boom".into()
            }
        );
    }

    #[test]
    fn unrecovered_error_after_response_only_ends() {
        let server = Server::new(tree(Descriptor::new(|inv: Invocation| async move {
            inv.exchange
                .respond(ResponseHead::new(StatusCode::OK), RespondOptions::KEEP_OPEN)?;
            Err::<(), BoxError>("late failure".into())
        })));
        let session = server.on_session_open(ContextData::new());
        let stream = MemoryExchange::new(1);

        tokio_test::block_on(server.on_exchange_open(stream.clone(), Headers::new(), 0, &session));

        assert_eq!(stream.response_count(), 1);
        assert_eq!(stream.status(), Some(StatusCode::OK));
        assert!(stream.is_ended());
    }

    #[tokio::test]
    async fn spawned_exchanges_run_concurrently() {
        let server = Server::new(tree(Descriptor::new(|inv: Invocation| async move {
            inv.exchange.respond_status(StatusCode::NO_CONTENT)
        })));
        let session = server.on_session_open(ContextData::new());

        let streams: Vec<_> = (1..=8).map(MemoryExchange::new).collect();
        let handles: Vec<_> = streams
            .iter()
            .map(|s| server.spawn_exchange(s.clone(), Headers::new(), 0, &session))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(
            streams
                .iter()
                .all(|s| s.status() == Some(StatusCode::NO_CONTENT))
        );
        assert_eq!(server.stats().exchanges, 8);
    }

    #[tokio::test]
    async fn configuration_decorates_root() {
        let mut config = SwitchyardConfig::default();
        config.server.alt_svc = Some("h3=\":8443\"".into());
        config.cors = Some(CorsConfig::allow_origin("https://app.example"));

        let server = Server::from_config(
            &config,
            tree(Descriptor::new(|inv: Invocation| async move {
                inv.exchange.respond_status(StatusCode::OK)
            })),
        )
        .unwrap();
        let session = server.on_session_open(ContextData::new());
        let stream = MemoryExchange::new(1);

        server
            .on_exchange_open(stream.clone(), Headers::new(), 0, &session)
            .await;

        let head = stream.response().unwrap();
        assert_eq!(
            head.headers
                .get(switchyard_core::names::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("https://app.example")
        );
        assert_eq!(stream.alt_svc(), ["h3=\":8443\""]);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = SwitchyardConfig::default();
        config.server.port = 0;

        assert!(Server::from_config(&config, tree(Descriptor::default())).is_err());
    }
}
