//! Wire session handling
//!
//! A `Wire` owns one transport, a receive buffer that only grows, and a
//! cursor into it. Every read goes through `read_byte`, which waits on the
//! transport whenever the cursor has caught up with what has arrived.
//! The buffer is dropped wholesale after a call once the cursor has moved
//! far enough; a call never starts with bytes still pending from a
//! previous one, so nothing in flight is lost.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;

use super::{TcpTransport, Transport, WireConfig};
use crate::error::{WireError, WireResult};
use crate::protocol::{
    decode_number, decode_string, encode_funcall, ByteSource, Reply, WireValue, EVALUATE,
};

/// Bytes at the head of a fresh receive buffer that are never read
const RESERVED_PREFIX: usize = 1;

/// State of a wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireState {
    /// No transport attached yet
    Disconnected,
    /// Transport attached, calls can be made
    Connected,
    /// Closed for good, a new wire is needed
    Closed,
}

/// Wire statistics
#[derive(Debug, Default, Clone)]
pub struct WireStats {
    /// Completed evaluation calls
    pub calls: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Times the receive buffer was dropped
    pub compactions: u64,
}

/// A session with an eval server
pub struct Wire {
    config: WireConfig,
    transport: Option<Box<dyn Transport>>,
    /// Everything received since the last compaction
    recv_buf: BytesMut,
    /// Next unread offset in `recv_buf`
    position: usize,
    write_buf: BytesMut,
    state: WireState,
    stats: WireStats,
}

impl Wire {
    /// Create a wire with no transport
    pub fn new(config: WireConfig) -> Self {
        let mut recv_buf = BytesMut::with_capacity(config.read_chunk_size);
        recv_buf.resize(RESERVED_PREFIX, 0);

        Self {
            config,
            transport: None,
            recv_buf,
            position: RESERVED_PREFIX,
            write_buf: BytesMut::with_capacity(256),
            state: WireState::Disconnected,
            stats: WireStats::default(),
        }
    }

    /// Connect to an eval server
    pub async fn connect(host: &str, port: u16, config: WireConfig) -> WireResult<Self> {
        let mut wire = Self::new(config);
        wire.open(host, port).await?;
        Ok(wire)
    }

    /// Create a connected wire over an existing transport
    pub fn with_transport<T: Transport + 'static>(transport: T, config: WireConfig) -> Self {
        let mut wire = Self::new(config);
        wire.transport = Some(Box::new(transport));
        wire.state = WireState::Connected;
        wire
    }

    /// Open a TCP connection on a disconnected wire
    pub async fn open(&mut self, host: &str, port: u16) -> WireResult<()> {
        self.check_disconnected()?;
        let transport = TcpTransport::connect(host, port, &self.config).await?;
        self.attach(transport)?;

        tracing::info!("Wire connected to {}:{}", host, port);
        Ok(())
    }

    /// Attach a transport to a disconnected wire
    pub fn attach<T: Transport + 'static>(&mut self, transport: T) -> WireResult<()> {
        self.check_disconnected()?;
        self.transport = Some(Box::new(transport));
        self.state = WireState::Connected;
        Ok(())
    }

    fn check_disconnected(&self) -> WireResult<()> {
        match self.state {
            WireState::Disconnected => Ok(()),
            WireState::Connected => Err(WireError::AlreadyConnected),
            WireState::Closed => Err(WireError::AlreadyClosed),
        }
    }

    /// Get the current state
    pub fn state(&self) -> WireState {
        self.state
    }

    /// Check if calls can be made
    pub fn is_connected(&self) -> bool {
        self.state == WireState::Connected
    }

    /// Next unread offset in the receive buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes currently held in the receive buffer
    pub fn buffered(&self) -> usize {
        self.recv_buf.len()
    }

    /// Get wire statistics
    pub fn stats(&self) -> &WireStats {
        &self.stats
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Read the byte under the cursor, waiting for it to arrive if needed
    pub async fn read_byte(&mut self) -> WireResult<u8> {
        while self.position >= self.recv_buf.len() {
            self.fill().await?;
        }

        let byte = self.recv_buf[self.position];
        self.position += 1;
        Ok(byte)
    }

    /// Wait for more input from the transport
    async fn fill(&mut self) -> WireResult<()> {
        let offset = self.position;
        let transport = self.transport.as_mut().ok_or(WireError::NotConnected)?;

        let outcome = if transport.is_open() {
            transport
                .poll_for_more_input(&mut self.recv_buf, self.config.read_timeout)
                .await
        } else {
            Ok(0)
        };

        match outcome {
            Ok(0) => Err(self
                .fail(WireError::Communication {
                    offset,
                    reason: "Connection closed by peer".to_string(),
                })
                .await),
            Ok(n) => {
                self.stats.bytes_received += n as u64;
                tracing::trace!("Received {} bytes, {} buffered", n, self.recv_buf.len());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                let after = self.config.read_timeout.unwrap_or_default();
                Err(self.fail(WireError::Timeout { offset, after }).await)
            }
            Err(e) => Err(self
                .fail(WireError::Communication {
                    offset,
                    reason: e.to_string(),
                })
                .await),
        }
    }

    /// Tear the wire down after an error that leaves the stream unusable
    async fn fail(&mut self, err: WireError) -> WireError {
        tracing::warn!("Closing wire: {}", err);
        self.close().await;
        err
    }

    /// Read a 4 byte number
    pub async fn read_number(&mut self) -> WireResult<u32> {
        decode_number(self).await
    }

    /// Read a length-prefixed string
    pub async fn read_string(&mut self) -> WireResult<Bytes> {
        decode_string(self).await
    }

    /// Send a remote call and flush it. Does not wait for a reply.
    pub async fn funcall(&mut self, function: &WireValue, args: &[WireValue]) -> WireResult<()> {
        let offset = self.position;
        let transport = self.transport.as_mut().ok_or(WireError::NotConnected)?;

        self.write_buf.clear();
        encode_funcall(function, args, &mut self.write_buf);

        let sent = match transport.write(&self.write_buf).await {
            Ok(()) => transport.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = sent {
            return Err(self
                .fail(WireError::Communication {
                    offset,
                    reason: format!("Send failed: {}", e),
                })
                .await);
        }

        self.stats.bytes_sent += self.write_buf.len() as u64;
        let name = match function {
            WireValue::Symbol(name) => name.as_str(),
            other => other.kind(),
        };
        tracing::debug!(
            "Sent funcall {} with {} args ({} bytes)",
            name,
            args.len(),
            self.write_buf.len()
        );
        Ok(())
    }

    /// Evaluate an expression on the server and wait for its reply
    pub async fn remote_eval(&mut self, expression: &str) -> WireResult<Reply> {
        self.funcall(&WireValue::symbol(EVALUATE), &[WireValue::from(expression)])
            .await?;

        let status = self.read_number().await?;
        let condition = self.read_string().await?;
        let result = self.read_string().await?;

        self.stats.calls += 1;
        tracing::debug!(
            "Eval reply: status={} condition={} bytes result={} bytes",
            status,
            condition.len(),
            result.len()
        );

        self.compact_if_needed();

        Ok(Reply {
            status,
            condition,
            result,
        })
    }

    /// Drop the receive buffer once the cursor is past the threshold.
    /// Only valid between calls.
    fn compact_if_needed(&mut self) {
        if self.position <= self.config.compaction_threshold {
            return;
        }

        tracing::debug!(
            "Compacting receive buffer at offset {} ({} bytes)",
            self.position,
            self.recv_buf.len()
        );
        self.recv_buf.clear();
        self.position = 0;
        self.stats.compactions += 1;
    }

    /// Close the wire. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if transport.is_open() {
                if let Err(e) = transport.shutdown().await {
                    tracing::warn!("Transport shutdown failed: {}", e);
                }
            }
            tracing::info!("Wire closed");
        }

        self.recv_buf = BytesMut::new();
        self.position = 0;
        self.state = WireState::Closed;
    }
}

#[async_trait]
impl ByteSource for Wire {
    async fn read_byte(&mut self) -> WireResult<u8> {
        Wire::read_byte(self).await
    }

    fn offset(&self) -> usize {
        self.position
    }
}
