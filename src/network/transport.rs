//! Transport trait definitions
//!
//! The wire session only needs a duplex byte stream it can write to, wait
//! on for more input, and shut down. `StreamTransport` provides that over
//! any tokio stream; `TcpTransport` is the one used for real connections.

use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{resolve_host, WireConfig};
use crate::error::{WireError, WireResult};

/// Trait for the byte stream underneath a wire session
#[async_trait]
pub trait Transport: Send {
    /// Queue bytes for delivery, in order
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Push queued bytes out to the peer
    async fn flush(&mut self) -> io::Result<()>;

    /// Wait for input and append whatever arrived to `buf`.
    /// Returns the number of bytes appended; 0 means the peer closed.
    /// Fails with `ErrorKind::TimedOut` when `timeout` elapses first.
    async fn poll_for_more_input(
        &mut self,
        buf: &mut BytesMut,
        timeout: Option<Duration>,
    ) -> io::Result<usize>;

    /// Whether input may still arrive
    fn is_open(&self) -> bool;

    /// Close the stream
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Transport over any tokio byte stream
pub struct StreamTransport<S> {
    stream: S,
    read_chunk_size: usize,
    open: bool,
}

pub type TcpTransport = StreamTransport<TcpStream>;

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, read_chunk_size: usize) -> Self {
        Self {
            stream,
            read_chunk_size: read_chunk_size.max(1),
            open: true,
        }
    }

    /// Get the underlying stream
    pub fn stream_ref(&self) -> &S {
        &self.stream
    }
}

impl TcpTransport {
    /// Connect to `host:port` within the configured timeout
    pub async fn connect(host: &str, port: u16, config: &WireConfig) -> WireResult<Self> {
        let addr_string = format!("{}:{}", host, port);
        let connection_error = |source: io::Error| WireError::Connection {
            addr: addr_string.clone(),
            source,
        };

        let addr = resolve_host(host, port).await.map_err(connection_error)?;

        tracing::info!("Connecting to {}", addr);

        let stream = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(connection_error(e)),
            Err(_) => {
                return Err(connection_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", config.connect_timeout),
                )))
            }
        };
        stream.set_nodelay(true).map_err(connection_error)?;

        Ok(Self::new(stream, config.read_chunk_size))
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }

    async fn poll_for_more_input(
        &mut self,
        buf: &mut BytesMut,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        if !self.open {
            return Ok(0);
        }

        buf.reserve(self.read_chunk_size);
        let n = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.stream.read_buf(buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no input within {:?}", limit),
                    ))
                }
            },
            None => self.stream.read_buf(buf).await?,
        };

        if n == 0 {
            self.open = false;
        }
        Ok(n)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.open = false;
        self.stream.shutdown().await
    }
}
