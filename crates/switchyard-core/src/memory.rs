//! In-memory exchange stream.
//!
//! [`MemoryExchange`] records everything written to it, which makes it the
//! stream of choice for tests and for driving a routing tree without a
//! network transport.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use parking_lot::Mutex;

use crate::error::{TransportError, TransportResult};
use crate::exchange::{ExchangeStream, RespondOptions, ResponseHead};

#[derive(Debug, Default)]
struct MemoryState {
    responses: Vec<(ResponseHead, RespondOptions)>,
    body: BytesMut,
    ended: bool,
    request_body: VecDeque<Bytes>,
    readable: bool,
    alt_svc: Vec<String>,
}

/// An [`ExchangeStream`] that lives entirely in memory.
#[derive(Debug)]
pub struct MemoryExchange {
    id: u32,
    state: Mutex<MemoryState>,
}

impl MemoryExchange {
    /// Creates a stream with no request body.
    pub fn new(id: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(MemoryState::default()),
        })
    }

    /// Creates a stream whose request body arrives as `chunks`.
    pub fn with_body<I, B>(id: u32, chunks: I) -> Arc<Self>
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let state = MemoryState {
            request_body: chunks.into_iter().map(Into::into).collect(),
            readable: true,
            ..Default::default()
        };
        Arc::new(Self {
            id,
            state: Mutex::new(state),
        })
    }

    /// All response heads sent, in order.
    pub fn responses(&self) -> Vec<ResponseHead> {
        self.state
            .lock()
            .responses
            .iter()
            .map(|(head, _)| head.clone())
            .collect()
    }

    /// Number of response heads sent.
    pub fn response_count(&self) -> usize {
        self.state.lock().responses.len()
    }

    /// The first response head, if any.
    pub fn response(&self) -> Option<ResponseHead> {
        self.state
            .lock()
            .responses
            .first()
            .map(|(head, _)| head.clone())
    }

    /// Status of the first response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|head| head.status)
    }

    /// Body bytes written so far.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().body)
    }

    /// ALTSVC values announced for this stream.
    pub fn alt_svc(&self) -> Vec<String> {
        self.state.lock().alt_svc.clone()
    }

    /// Returns `true` once the writable side has been ended.
    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }
}

#[async_trait]
impl ExchangeStream for MemoryExchange {
    fn id(&self) -> u32 {
        self.id
    }

    fn headers_sent(&self) -> bool {
        !self.state.lock().responses.is_empty()
    }

    fn respond(&self, head: ResponseHead, options: RespondOptions) -> TransportResult<()> {
        let mut state = self.state.lock();
        if !state.responses.is_empty() {
            return Err(TransportError::HeadersAlreadySent { stream_id: self.id });
        }
        if state.ended {
            return Err(TransportError::WritableEnded { stream_id: self.id });
        }
        state.responses.push((head, options));
        if options.end_stream {
            state.ended = true;
        }
        Ok(())
    }

    async fn write(&self, data: Bytes) -> TransportResult<()> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(TransportError::WritableEnded { stream_id: self.id });
        }
        state.body.extend_from_slice(&data);
        Ok(())
    }

    fn end(&self) -> TransportResult<()> {
        self.state.lock().ended = true;
        Ok(())
    }

    fn writable_ended(&self) -> bool {
        self.state.lock().ended
    }

    fn readable(&self) -> bool {
        self.state.lock().readable
    }

    async fn read_chunk(&self) -> TransportResult<Option<Bytes>> {
        let mut state = self.state.lock();
        let chunk = state.request_body.pop_front();
        if chunk.is_none() {
            state.readable = false;
        }
        Ok(chunk)
    }

    fn announce_alt_svc(&self, value: &str) -> TransportResult<()> {
        self.state.lock().alt_svc.push(value.to_string());
        Ok(())
    }
}
