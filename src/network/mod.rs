//! Network module - Talks to the eval server
//!
//! Provides:
//! - The transport abstraction and its TCP implementation
//! - The wire session: receive buffer, read cursor and remote evaluation

mod transport;
mod wire;

pub use transport::*;
pub use wire::*;

use std::net::SocketAddr;
use std::time::Duration;

/// Default cursor offset past which the receive buffer is dropped
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 100_000;

/// Configuration for wire sessions
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Upper bound on each wait for input; `None` waits forever
    pub read_timeout: Option<Duration>,
    /// Cursor offset that triggers compaction after a call
    pub compaction_threshold: usize,
    /// Bytes reserved in the receive buffer per read
    pub read_chunk_size: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            read_timeout: None,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            read_chunk_size: 4096,
        }
    }
}

impl WireConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_compaction_threshold(mut self, threshold: usize) -> Self {
        self.compaction_threshold = threshold;
        self
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
