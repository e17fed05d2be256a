//! Exchange abstraction: the interface the multiplexed transport presents.
//!
//! One *exchange* is a single request/response pair carried on a session.
//! The transport implements [`ExchangeStream`]; everything above it works with
//! the cheaply cloneable [`Exchange`] handle, which pairs the stream with a
//! chain of [`Responder`]s.
//!
//! # Responder chain
//!
//! Responses never go to the stream directly. Routing nodes that need to
//! augment every response of an exchange (CORS being the main user) wrap the
//! current responder in a decorator and hand the *new* handle down the tree:
//!
//! ```text
//! handler ──respond──▶ PatchedResponder ──merge──▶ StreamResponder ──▶ stream
//! ```
//!
//! The handle held by the caller is unchanged, so nothing is patched in place.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::StatusCode;

use crate::error::{TransportError, TransportResult};
use crate::headers::Headers;

// =============================================================================
// Transport interface
// =============================================================================

/// The status and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Response status.
    pub status: StatusCode,
    /// Response headers (without `:status`).
    pub headers: Headers,
}

impl ResponseHead {
    /// Creates a response head with no headers.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Options accompanying a response head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RespondOptions {
    /// Close the writable side right after the head is sent.
    pub end_stream: bool,
}

impl RespondOptions {
    /// Send the head and end the stream.
    pub const END_STREAM: Self = Self { end_stream: true };
    /// Send the head and keep the stream open for a body.
    pub const KEEP_OPEN: Self = Self { end_stream: false };
}

/// One request/response stream, as delivered by the transport.
#[async_trait]
pub trait ExchangeStream: Send + Sync {
    /// Transport-assigned stream id.
    fn id(&self) -> u32;

    /// Returns `true` once a response head has been sent.
    fn headers_sent(&self) -> bool;

    /// Sends the response head.
    fn respond(&self, head: ResponseHead, options: RespondOptions) -> TransportResult<()>;

    /// Writes body bytes.
    async fn write(&self, data: Bytes) -> TransportResult<()>;

    /// Ends the writable side of the stream.
    fn end(&self) -> TransportResult<()>;

    /// Returns `true` once the writable side has been ended.
    fn writable_ended(&self) -> bool;

    /// Returns `true` while request body bytes may still arrive.
    fn readable(&self) -> bool;

    /// Reads the next request body chunk, or `None` at end of body.
    async fn read_chunk(&self) -> TransportResult<Option<Bytes>>;

    /// Advertises an alternative service for this stream's origin on the session.
    fn announce_alt_svc(&self, value: &str) -> TransportResult<()>;
}

// =============================================================================
// Responders
// =============================================================================

/// Something that can send a response head for an exchange.
pub trait Responder: Send + Sync {
    /// Sends `head` with `options`.
    fn respond(&self, head: ResponseHead, options: RespondOptions) -> TransportResult<()>;
}

/// A shared responder.
pub type BoxedResponder = Arc<dyn Responder>;

/// The base of every responder chain: forwards to the stream.
///
/// Refuses to respond twice, so a chain can never double-respond.
struct StreamResponder {
    stream: Arc<dyn ExchangeStream>,
}

impl Responder for StreamResponder {
    fn respond(&self, head: ResponseHead, options: RespondOptions) -> TransportResult<()> {
        if self.stream.headers_sent() {
            return Err(TransportError::HeadersAlreadySent {
                stream_id: self.stream.id(),
            });
        }
        self.stream.respond(head, options)
    }
}

/// A decorator that merges a fixed header set into every response.
///
/// Patched headers win over the headers supplied by the caller.
pub struct PatchedResponder {
    inner: BoxedResponder,
    patch: Headers,
}

impl PatchedResponder {
    /// Wraps `inner`, merging `patch` into each response.
    pub fn new(inner: BoxedResponder, patch: Headers) -> Self {
        Self { inner, patch }
    }
}

impl Responder for PatchedResponder {
    fn respond(&self, mut head: ResponseHead, options: RespondOptions) -> TransportResult<()> {
        head.headers.extend_from(&self.patch);
        self.inner.respond(head, options)
    }
}

// =============================================================================
// Exchange handle
// =============================================================================

/// Handle to one exchange as seen by routing nodes and pipeline steps.
#[derive(Clone)]
pub struct Exchange {
    stream: Arc<dyn ExchangeStream>,
    responder: BoxedResponder,
}

impl Exchange {
    /// Creates a handle whose responses go straight to `stream`.
    pub fn new(stream: Arc<dyn ExchangeStream>) -> Self {
        let responder = Arc::new(StreamResponder {
            stream: Arc::clone(&stream),
        });
        Self { stream, responder }
    }

    /// Returns a handle whose responder chain is `wrap(current chain)`.
    ///
    /// `self` keeps its own chain.
    pub fn with_responder<F>(&self, wrap: F) -> Self
    where
        F: FnOnce(BoxedResponder) -> BoxedResponder,
    {
        Self {
            stream: Arc::clone(&self.stream),
            responder: wrap(Arc::clone(&self.responder)),
        }
    }

    /// Returns a handle that merges `patch` into every response.
    pub fn with_header_patch(&self, patch: Headers) -> Self {
        self.with_responder(|inner| Arc::new(PatchedResponder::new(inner, patch)))
    }

    /// The underlying stream.
    pub fn stream(&self) -> &Arc<dyn ExchangeStream> {
        &self.stream
    }

    /// Transport-assigned stream id.
    pub fn id(&self) -> u32 {
        self.stream.id()
    }

    /// Returns `true` once a response head has been sent.
    pub fn headers_sent(&self) -> bool {
        self.stream.headers_sent()
    }

    /// Returns `true` once the writable side has been ended.
    pub fn writable_ended(&self) -> bool {
        self.stream.writable_ended()
    }

    /// Returns `true` while request body bytes may still arrive.
    pub fn readable(&self) -> bool {
        self.stream.readable()
    }

    /// Sends a response head through the responder chain.
    pub fn respond(&self, head: ResponseHead, options: RespondOptions) -> TransportResult<()> {
        self.responder.respond(head, options)
    }

    /// Sends a header-only response and ends the stream.
    pub fn respond_status(&self, status: StatusCode) -> TransportResult<()> {
        self.respond(ResponseHead::new(status), RespondOptions::END_STREAM)
    }

    /// Writes body bytes.
    pub async fn write(&self, data: impl Into<Bytes>) -> TransportResult<()> {
        self.stream.write(data.into()).await
    }

    /// Ends the writable side.
    pub fn end(&self) -> TransportResult<()> {
        self.stream.end()
    }

    /// Reads the next request body chunk.
    pub async fn read_chunk(&self) -> TransportResult<Option<Bytes>> {
        self.stream.read_chunk().await
    }

    /// Collects the remaining request body.
    pub async fn read_to_end(&self) -> TransportResult<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.stream.read_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Advertises an alternative service on the session.
    pub fn announce_alt_svc(&self, value: &str) -> TransportResult<()> {
        self.stream.announce_alt_svc(value)
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.stream.id())
            .field("headers_sent", &self.stream.headers_sent())
            .field("writable_ended", &self.stream.writable_ended())
            .finish_non_exhaustive()
    }
}
