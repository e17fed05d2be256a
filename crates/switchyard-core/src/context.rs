//! Connection- and exchange-scoped context bags.
//!
//! Two tiers model the lifetime of data while exchanges are dispatched:
//!
//! - [`SessionContext`]: one per transport session. Every exchange on the
//!   same connection holds a handle to the same bag.
//!
//! - [`StreamContext`]: one per exchange. It wraps the session's bag and adds
//!   its own key/value data, the progressively consumed `processedHeaders`,
//!   and the monotonic `done` latch.
//!
//! # Concurrency
//!
//! Exchanges on one session run concurrently, and all of them may write to
//! the shared [`SessionContext`]. Individual reads and writes are atomic, but
//! nothing orders writes coming from different exchanges: treat session
//! fields as racing writers (append-only or exchange-namespaced keys).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::headers::Headers;

/// The free-form key/value bag carried by both context tiers.
pub type ContextData = serde_json::Map<String, Value>;

/// Reserved key resolving to the wrapped session context.
pub const SESSION_DATA_KEY: &str = "sessionData";
/// Reserved key resolving to the `done` latch.
pub const DONE_KEY: &str = "done";
/// Reserved key resolving to the processed header set.
pub const PROCESSED_HEADERS_KEY: &str = "processedHeaders";
/// Key under which query parameters are stored.
pub const SEARCH_PARAMS_KEY: &str = "searchParams";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// SessionContext — one per connection
// =============================================================================

struct SessionInner {
    id: u64,
    data: RwLock<ContextData>,
}

/// Connection-scoped context, shared by every exchange on the session.
///
/// Cloning yields another handle to the same bag.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    /// Creates a session context seeded from `initial`.
    pub fn new(initial: ContextData) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                data: RwLock::new(initial),
            }),
        }
    }

    /// Process-unique id of this session, for logging.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.read().get(key).cloned()
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.data.write().insert(key.into(), value.into())
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.data.write().remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.data.read().contains_key(key)
    }

    /// Copies every field of `fields` into the bag, overwriting existing keys.
    pub fn merge(&self, fields: ContextData) {
        self.inner.data.write().extend(fields);
    }

    /// A copy of the whole bag.
    pub fn snapshot(&self) -> ContextData {
        self.inner.data.read().clone()
    }

    /// Returns `true` if both handles refer to the same session.
    pub fn ptr_eq(&self, other: &SessionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(ContextData::new())
    }
}

impl From<ContextData> for SessionContext {
    fn from(data: ContextData) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.inner.id)
            .field("data", &*self.inner.data.read())
            .finish()
    }
}

// =============================================================================
// StreamContext — one per exchange
// =============================================================================

struct StreamInner {
    session: SessionContext,
    data: RwLock<ContextData>,
    processed_headers: RwLock<Headers>,
    /// Only ever goes from `false` to `true`.
    done: AtomicBool,
}

/// Exchange-scoped context wrapping the connection's [`SessionContext`].
///
/// Cloning yields another handle to the same exchange state; every step of an
/// exchange's pipeline sees the same context.
#[derive(Clone)]
pub struct StreamContext {
    inner: Arc<StreamInner>,
}

impl StreamContext {
    /// Creates an exchange context.
    ///
    /// `session` may be an existing [`SessionContext`] (wrapped, not copied) or
    /// plain [`ContextData`], which creates a fresh session. A `sessionData`
    /// entry in `initial` is discarded; a `processedHeaders` object seeds the
    /// processed header set.
    pub fn new(session: impl Into<SessionContext>, mut initial: ContextData) -> Self {
        initial.remove(SESSION_DATA_KEY);
        initial.remove(DONE_KEY);

        let processed_headers = match initial.remove(PROCESSED_HEADERS_KEY) {
            Some(value) => headers_from_value(value),
            None => Headers::new(),
        };

        Self {
            inner: Arc::new(StreamInner {
                session: session.into(),
                data: RwLock::new(initial),
                processed_headers: RwLock::new(processed_headers),
                done: AtomicBool::new(false),
            }),
        }
    }

    /// Promotes a session context into the context of a new exchange, seeding
    /// `processedHeaders` with a copy of the raw `headers`.
    pub fn promote(session: &SessionContext, headers: &Headers) -> Self {
        let context = Self::new(session.clone(), ContextData::new());
        *context.inner.processed_headers.write() = headers.clone();
        context
    }

    // ─── Session delegation ───────────────────────────────────────────────────

    /// The wrapped session context.
    pub fn session_data(&self) -> &SessionContext {
        &self.inner.session
    }

    /// Merges `fields` into the wrapped session context.
    ///
    /// The session reference itself is never replaced.
    pub fn merge_session_data(&self, fields: ContextData) {
        self.inner.session.merge(fields);
    }

    // ─── Done latch ───────────────────────────────────────────────────────────

    /// Returns `true` once any step declared the exchange done.
    pub fn done(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }

    /// Writes the latch and returns its resulting value.
    ///
    /// Writing `false` after the latch is set changes nothing and returns `true`.
    pub fn set_done(&self, value: bool) -> bool {
        self.inner.done.fetch_or(value, Ordering::SeqCst) || value
    }

    /// Shorthand for `set_done(true)`.
    pub fn mark_done(&self) {
        self.set_done(true);
    }

    // ─── Processed headers ────────────────────────────────────────────────────

    /// A copy of the header set as rewritten by routing so far.
    pub fn processed_headers(&self) -> Headers {
        self.inner.processed_headers.read().clone()
    }

    /// One processed header value.
    pub fn processed_header(&self, name: &str) -> Option<String> {
        self.inner
            .processed_headers
            .read()
            .get(name)
            .map(str::to_string)
    }

    /// Rewrites one processed header.
    pub fn set_processed_header(&self, name: &str, value: impl Into<String>) {
        self.inner.processed_headers.write().insert(name, value);
    }

    // ─── Search params ────────────────────────────────────────────────────────

    /// The query parameters extracted by routing.
    pub fn search_params(&self) -> BTreeMap<String, String> {
        match self.inner.data.read().get(SEARCH_PARAMS_KEY) {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Replaces the stored query parameters.
    pub fn set_search_params(&self, params: BTreeMap<String, String>) {
        let map: ContextData = params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        self.inner
            .data
            .write()
            .insert(SEARCH_PARAMS_KEY.to_string(), Value::Object(map));
    }

    // ─── Generic field access ─────────────────────────────────────────────────

    /// Reads a field.
    ///
    /// `sessionData` yields a snapshot of the session bag, `done` the latch,
    /// `processedHeaders` the processed header set; any other key reads the
    /// exchange-local bag.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            SESSION_DATA_KEY => Some(Value::Object(self.inner.session.snapshot())),
            DONE_KEY => Some(Value::Bool(self.done())),
            PROCESSED_HEADERS_KEY => serde_json::to_value(self.processed_headers()).ok(),
            _ => self.inner.data.read().get(key).cloned(),
        }
    }

    /// Writes a field, returning the previous value.
    ///
    /// Writing an object to `sessionData` merges its fields into the session;
    /// writing to `done` goes through the latch; writing an object to
    /// `processedHeaders` replaces the processed header set.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            SESSION_DATA_KEY => {
                match value {
                    Value::Object(fields) => self.merge_session_data(fields),
                    other => warn!(value = %other, "Ignoring non-object write to sessionData"),
                }
                None
            }
            DONE_KEY => {
                let previous = self.done();
                self.set_done(value.as_bool().unwrap_or(false));
                Some(Value::Bool(previous))
            }
            PROCESSED_HEADERS_KEY => {
                let previous = self.get(PROCESSED_HEADERS_KEY);
                *self.inner.processed_headers.write() = headers_from_value(value);
                previous
            }
            _ => self.inner.data.write().insert(key, value),
        }
    }

    /// Removes an exchange-local field. Reserved keys cannot be removed.
    pub fn remove(&self, key: &str) -> Option<Value> {
        match key {
            SESSION_DATA_KEY | DONE_KEY | PROCESSED_HEADERS_KEY => None,
            _ => self.inner.data.write().remove(key),
        }
    }

    /// Returns `true` if `key` is present. Reserved keys are always present.
    pub fn contains(&self, key: &str) -> bool {
        match key {
            SESSION_DATA_KEY | DONE_KEY | PROCESSED_HEADERS_KEY => true,
            _ => self.inner.data.read().contains_key(key),
        }
    }
}

impl fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamContext")
            .field("session", &self.inner.session.id())
            .field("done", &self.done())
            .field("processed_headers", &*self.inner.processed_headers.read())
            .field("data", &*self.inner.data.read())
            .finish()
    }
}

fn headers_from_value(value: Value) -> Headers {
    match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect(),
        _ => Headers::new(),
    }
}

// =============================================================================
// RouteContext — what a routing node receives
// =============================================================================

/// The context handed to a routing node.
///
/// The first node an exchange reaches receives the connection's
/// [`SessionContext`] and promotes it; nested nodes receive the promoted
/// [`StreamContext`].
#[derive(Debug, Clone)]
pub enum RouteContext {
    /// Not yet promoted: this is the first node for the exchange.
    Session(SessionContext),
    /// Already promoted by an outer node.
    Stream(StreamContext),
}

impl RouteContext {
    /// Returns the exchange context, promoting a session context exactly once.
    pub fn into_stream(self, headers: &Headers) -> StreamContext {
        match self {
            Self::Session(session) => StreamContext::promote(&session, headers),
            Self::Stream(stream) => stream,
        }
    }
}

impl From<SessionContext> for RouteContext {
    fn from(session: SessionContext) -> Self {
        Self::Session(session)
    }
}

impl From<&SessionContext> for RouteContext {
    fn from(session: &SessionContext) -> Self {
        Self::Session(session.clone())
    }
}

impl From<StreamContext> for RouteContext {
    fn from(stream: StreamContext) -> Self {
        Self::Stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> ContextData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn session_context_is_pass_through() {
        let session = SessionContext::new(data(json!({ "user": "ann" })));

        assert_eq!(session.get("user"), Some(json!("ann")));
        assert!(!session.contains("missing"));

        session.set("visits", 3);
        assert_eq!(session.get("visits"), Some(json!(3)));
        assert_eq!(session.remove("visits"), Some(json!(3)));
        assert!(!session.contains("visits"));
    }

    #[test]
    fn done_latch_is_monotonic() {
        let ctx = StreamContext::new(SessionContext::default(), ContextData::new());
        assert!(!ctx.done());

        assert!(!ctx.set_done(false));
        assert!(ctx.set_done(true));
        assert!(ctx.set_done(false));
        assert!(ctx.done());

        ctx.set(DONE_KEY, false);
        assert_eq!(ctx.get(DONE_KEY), Some(json!(true)));
    }

    #[test]
    fn wraps_existing_session_and_discards_seeded_session_data() {
        let session = SessionContext::new(data(json!({ "a": 1 })));
        let ctx = StreamContext::new(
            session.clone(),
            data(json!({ "sessionData": { "bogus": true }, "local": "x" })),
        );

        assert!(ctx.session_data().ptr_eq(&session));
        assert_eq!(ctx.get(SESSION_DATA_KEY), Some(json!({ "a": 1 })));
        assert_eq!(ctx.get("local"), Some(json!("x")));
    }

    #[test]
    fn raw_data_creates_fresh_session() {
        let ctx = StreamContext::new(data(json!({ "token": "t" })), ContextData::new());
        assert_eq!(ctx.session_data().get("token"), Some(json!("t")));
    }

    #[test]
    fn session_data_writes_merge() {
        let session = SessionContext::new(data(json!({ "a": 1, "b": 2 })));
        let ctx = StreamContext::new(session.clone(), ContextData::new());

        ctx.set(SESSION_DATA_KEY, json!({ "b": 20, "c": 30 }));

        assert!(ctx.session_data().ptr_eq(&session));
        assert_eq!(session.snapshot(), data(json!({ "a": 1, "b": 20, "c": 30 })));
    }

    #[test]
    fn promotion_copies_headers() {
        let headers = Headers::from([(":path", "/users/1")]);
        let ctx = RouteContext::from(SessionContext::default()).into_stream(&headers);

        ctx.set_processed_header(":path", "/1");
        assert_eq!(ctx.processed_header(":path").as_deref(), Some("/1"));
        assert_eq!(headers.path(), Some("/users/1"));

        let again = RouteContext::from(ctx.clone()).into_stream(&headers);
        assert_eq!(again.processed_header(":path").as_deref(), Some("/1"));
    }

    #[test]
    fn reserved_keys_are_always_present() {
        let ctx = StreamContext::new(SessionContext::default(), ContextData::new());

        assert!(ctx.contains(SESSION_DATA_KEY));
        assert!(ctx.contains(DONE_KEY));
        assert!(ctx.remove(DONE_KEY).is_none());
        assert!(!ctx.contains("body"));
    }
}
