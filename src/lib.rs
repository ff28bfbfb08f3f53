//! lispwire - client for a small binary remote-evaluation protocol
//!
//! Values are encoded with a one byte opcode followed by their payload;
//! the server answers an `EVALUATE` funcall with a fixed
//! (status, condition, result) triple.
//!
//! ```no_run
//! # async fn demo() -> lispwire::WireResult<()> {
//! use lispwire::{Wire, WireConfig};
//!
//! let mut wire = Wire::connect("127.0.0.1", 4005, WireConfig::default()).await?;
//! let reply = wire.remote_eval("(+ 40 2)").await?;
//! assert_eq!(reply.result_text(), "42");
//! wire.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod protocol;

pub use error::{ProtocolError, WireError, WireResult};
pub use network::{StreamTransport, TcpTransport, Transport, Wire, WireConfig, WireState};
pub use protocol::{Reply, WireValue};
