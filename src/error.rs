//! Error types shared by the codec and the wire session.

use std::time::Duration;
use thiserror::Error;

/// Malformed data found while decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Negative string length {length} at offset {offset}")]
    NegativeLength { offset: usize, length: i32 },

    #[error("Byte source exhausted at offset {offset}")]
    UnexpectedEnd { offset: usize },
}

/// Wire errors
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Communication failure at offset {offset}: {reason}")]
    Communication { offset: usize, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unsupported value type: {kind}")]
    UnsupportedType { kind: String },

    #[error("No input at offset {offset} after {after:?}")]
    Timeout { offset: usize, after: Duration },

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Wire already closed")]
    AlreadyClosed,
}

impl WireError {
    /// Errors after which the session has torn itself down
    pub fn is_fatal(&self) -> bool {
        matches!(self, WireError::Communication { .. } | WireError::Timeout { .. })
    }
}

pub type WireResult<T> = Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_converts() {
        let err: WireError = ProtocolError::NegativeLength { offset: 3, length: -1 }.into();
        assert!(matches!(err, WireError::Protocol(ProtocolError::NegativeLength { offset: 3, .. })));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display_carries_context() {
        let err = WireError::Communication {
            offset: 17,
            reason: "Connection closed by peer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Communication failure at offset 17: Connection closed by peer"
        );
        assert!(err.is_fatal());
    }
}
