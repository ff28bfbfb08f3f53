//! Protocol module - Defines the wire format spoken with the eval server
//!
//! The protocol uses a small tagged binary format:
//! - Numbers are 4 bytes, big-endian, unsigned
//! - Strings are a 4 byte length followed by the raw bytes
//! - Every other value is prefixed by a one byte opcode
//!
//! Replies to an evaluation request carry no opcode at all: they are a
//! fixed (number, string, string) triple.

mod value;
mod codec;

pub use value::*;
pub use codec::*;

/// Default port of the eval server
pub const DEFAULT_PORT: u16 = 4005;

/// Width of an encoded number
pub const NUMBER_SIZE: usize = 4;

/// Token written after every symbol name. Nothing on the read side
/// consumes it, but legacy peers expect it.
pub const SYMBOL_TRAILER: &str = "SKANK";

/// Function the server evaluates expressions with
pub const EVALUATE: &str = "EVALUATE";

/// The argument count of a funcall is a single byte
pub const MAX_FUNCALL_ARGS: usize = u8::MAX as usize;

/// One byte payload kind. Only ever written, never dispatched on when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Funcall = 6,
    Number = 7,
    String = 8,
    Symbol = 9,
    Cons = 13,
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(Opcode::Funcall.as_u8(), 6);
        assert_eq!(Opcode::Number.as_u8(), 7);
        assert_eq!(Opcode::String.as_u8(), 8);
        assert_eq!(Opcode::Symbol.as_u8(), 9);
        assert_eq!(Opcode::Cons.as_u8(), 13);
    }
}
