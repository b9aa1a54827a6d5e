//! Reply sinks
//!
//! Live connections and result capture (transactions, scripts) consume
//! replies through the same trait.

use super::types::RespValue;
use std::future::Future;
use std::io;

/// A sink for command replies
pub trait Transport {
    /// Queue a reply
    fn write(&mut self, value: RespValue);

    /// Push queued replies to the peer
    ///
    /// In-memory sinks have nothing to push.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Collects replies in memory instead of sending them anywhere
#[derive(Debug, Default)]
pub struct CaptureTransport {
    replies: Vec<RespValue>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    /// Consume the sink, returning the replies in write order
    pub fn into_replies(self) -> Vec<RespValue> {
        self.replies
    }
}

impl Transport for CaptureTransport {
    fn write(&mut self, value: RespValue) {
        self.replies.push(value);
    }
}
