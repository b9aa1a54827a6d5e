//! Connection handling
//!
//! Manages individual client connections, decoding RESP requests and
//! sending replies. Each connection drives its own `Dispatcher` session.

use crate::dispatch::Dispatcher;
use crate::commands::Reply;
use crate::protocol::{RespCodec, RespValue, Transport};
use base64::{engine::general_purpose, Engine as _};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Bytes of an undecodable request shown in the log
const LOGGED_PREFIX: usize = 64;

/// Connection handler
pub struct Connection {
    /// TCP stream
    stream: TcpStream,

    codec: RespCodec,

    /// Read buffer
    read_buffer: BytesMut,

    /// Write buffer
    write_buffer: BytesMut,
}

impl Transport for Connection {
    fn write(&mut self, value: RespValue) {
        // Encoding into memory cannot fail
        let _ = self.codec.encode(value, &mut self.write_buffer);
    }

    /// Send everything written so far
    async fn flush(&mut self) -> std::io::Result<()> {
        self.stream.write_all(&self.write_buffer).await?;
        self.write_buffer.clear();
        self.stream.flush().await
    }
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream) -> Self {
        Connection {
            stream,
            codec: RespCodec::new(),
            read_buffer: BytesMut::with_capacity(4096),
            write_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Handle the connection until the peer leaves or asks to quit
    ///
    /// Dropping the session on return cancels whatever it still has
    /// suspended on the kernel.
    pub async fn handle(&mut self, mut session: Dispatcher) -> anyhow::Result<()> {
        loop {
            // Answer every complete request already buffered
            loop {
                let frame = match self.codec.decode(&mut self.read_buffer) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        let shown = self.read_buffer.len().min(LOGGED_PREFIX);
                        warn!(
                            connection = session.connection_id(),
                            input = %general_purpose::STANDARD.encode(&self.read_buffer[..shown]),
                            "protocol error: {}",
                            e
                        );
                        self.write(RespValue::error(format!("ERR Protocol error: {}", e)));
                        self.flush().await?;
                        return Ok(());
                    }
                };

                let Some(reply) = self.run_request(&mut session, frame).await? else {
                    debug!(connection = session.connection_id(), "peer left during a request");
                    return Ok(());
                };

                let close = reply.is_close();
                self.write(reply.into_value());
                self.flush().await?;
                if close {
                    return Ok(());
                }
            }

            let n = self.stream.read_buf(&mut self.read_buffer).await?;
            if n == 0 {
                return Ok(());
            }
            debug!(connection = session.connection_id(), "read {} bytes", n);
        }
    }

    /// Wait for a reply while still noticing the peer going away
    ///
    /// Input arriving meanwhile is buffered for the next round.
    async fn run_request(
        &mut self,
        session: &mut Dispatcher,
        frame: RespValue,
    ) -> anyhow::Result<Option<Reply>> {
        let reply = session.dispatch(frame);
        tokio::pin!(reply);

        loop {
            tokio::select! {
                reply = &mut reply => return Ok(Some(reply)),
                read = self.stream.read_buf(&mut self.read_buffer) => {
                    if read? == 0 {
                        return Ok(None);
                    }
                }
            }
        }
    }
}
