//! RESP2 protocol implementation
//!
//! This module handles parsing and encoding of the Redis Serialization
//! Protocol. It is completely independent from other modules.

mod codec;
mod transport;
mod types;

pub use codec::{RespCodec, MAX_BULK_LEN, MAX_NESTING};
pub use transport::{CaptureTransport, Transport};
pub use types::{RespError, RespValue};
