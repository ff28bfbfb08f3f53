//! Protocol codec for encoding/decoding values
//!
//! Encoding writes into any `BufMut`. Decoding pulls one byte at a time
//! from a `ByteSource`, so the same decoders work against an in-memory
//! buffer and against a live session that has to wait for input.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};

use super::{Opcode, WireValue, MAX_FUNCALL_ARGS, NUMBER_SIZE, SYMBOL_TRAILER};
use crate::error::{ProtocolError, WireResult};

/// Largest up-front allocation made for a decoded string
const MAX_STRING_PREALLOC: usize = 64 * 1024;

/// Something bytes can be pulled from, one at a time
#[async_trait]
pub trait ByteSource: Send {
    /// Return the next byte, waiting for it if needed
    async fn read_byte(&mut self) -> WireResult<u8>;

    /// Offset of the next byte to be read
    fn offset(&self) -> usize;
}

/// A finite, already received run of bytes
#[derive(Debug, Clone)]
pub struct BufSource {
    buf: Bytes,
    offset: usize,
}

impl BufSource {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            offset: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

#[async_trait]
impl ByteSource for BufSource {
    async fn read_byte(&mut self) -> WireResult<u8> {
        let byte = *self
            .buf
            .get(self.offset)
            .ok_or(ProtocolError::UnexpectedEnd { offset: self.offset })?;
        self.offset += 1;
        Ok(byte)
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

/// Write `n` as `length` big-endian bytes. Bits that don't fit are dropped.
pub fn encode_number_sized<B: BufMut>(n: u64, length: usize, buf: &mut B) {
    for i in (0..length).rev() {
        let shift = u32::try_from(i * 8).unwrap_or(u32::MAX);
        buf.put_u8((n.checked_shr(shift).unwrap_or(0) & 0xff) as u8);
    }
}

pub fn encode_number<B: BufMut>(n: u32, buf: &mut B) {
    encode_number_sized(u64::from(n), NUMBER_SIZE, buf);
}

/// Length prefix then the raw bytes, no escaping
pub fn encode_string<B: BufMut>(s: &[u8], buf: &mut B) {
    encode_number_sized(s.len() as u64, NUMBER_SIZE, buf);
    buf.put_slice(s);
}

pub fn encode_symbol<B: BufMut>(name: &str, buf: &mut B) {
    buf.put_u8(Opcode::Symbol.as_u8());
    encode_string(name.as_bytes(), buf);
    encode_string(SYMBOL_TRAILER.as_bytes(), buf);
}

/// Encode a pair. The tail chain is walked in a loop so long lists don't
/// recurse once per element; heads still recurse.
pub fn encode_cons<B: BufMut>(head: &WireValue, tail: &WireValue, buf: &mut B) {
    buf.put_u8(Opcode::Cons.as_u8());
    encode_value(head, buf);

    let mut tail = tail;
    while let WireValue::Cons(next_head, next_tail) = tail {
        buf.put_u8(Opcode::Cons.as_u8());
        encode_value(next_head, buf);
        tail = next_tail;
    }
    encode_value(tail, buf);
}

pub fn encode_value<B: BufMut>(value: &WireValue, buf: &mut B) {
    match value {
        WireValue::Integer(n) => {
            buf.put_u8(Opcode::Number.as_u8());
            encode_number(*n, buf);
        }
        WireValue::String(s) => {
            buf.put_u8(Opcode::String.as_u8());
            encode_string(s, buf);
        }
        WireValue::Symbol(name) => encode_symbol(name, buf),
        WireValue::Cons(head, tail) => encode_cons(head, tail, buf),
    }
}

/// Encode a remote call. The argument count is one byte on the wire; past
/// 255 arguments it wraps and the peer will misread the frame.
pub fn encode_funcall<B: BufMut>(function: &WireValue, args: &[WireValue], buf: &mut B) {
    if args.len() > MAX_FUNCALL_ARGS {
        tracing::warn!(
            "Funcall with {} arguments exceeds the one byte count ({} max)",
            args.len(),
            MAX_FUNCALL_ARGS
        );
    }

    buf.put_u8(Opcode::Funcall.as_u8());
    buf.put_u8(args.len() as u8);
    encode_value(function, buf);
    for arg in args {
        encode_value(arg, buf);
    }
}

/// Encode a single value into a fresh buffer
pub fn encode_to_bytes(value: &WireValue) -> Bytes {
    let mut buf = BytesMut::new();
    encode_value(value, &mut buf);
    buf.freeze()
}

pub async fn decode_number<S: ByteSource + ?Sized>(source: &mut S) -> WireResult<u32> {
    let mut accum: u32 = 0;
    for _ in 0..NUMBER_SIZE {
        let byte = source.read_byte().await?;
        accum = accum * 256 + u32::from(byte);
    }
    Ok(accum)
}

pub async fn decode_string<S: ByteSource + ?Sized>(source: &mut S) -> WireResult<Bytes> {
    let offset = source.offset();
    let length = decode_number(source).await?;

    // The length is unsigned on the wire, but peers that treat it as a
    // signed integer can never have meant anything past i32::MAX.
    let signed = length as i32;
    if signed < 0 {
        return Err(ProtocolError::NegativeLength {
            offset,
            length: signed,
        }
        .into());
    }

    let length = length as usize;
    let mut out = BytesMut::with_capacity(length.min(MAX_STRING_PREALLOC));
    for _ in 0..length {
        out.put_u8(source.read_byte().await?);
    }
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;

    #[tokio::test]
    async fn test_number_roundtrip() {
        for n in [0u32, 1, 255, 256, 65_535, 0x0102_0304, u32::MAX] {
            let mut buf = BytesMut::new();
            encode_number(n, &mut buf);
            assert_eq!(buf.len(), 4);

            let mut source = BufSource::new(buf.freeze());
            assert_eq!(decode_number(&mut source).await.unwrap(), n);
            assert_eq!(source.remaining(), 0);
        }
    }

    #[test]
    fn test_number_is_big_endian() {
        let mut buf = BytesMut::new();
        encode_number(0x0102_0304, &mut buf);
        assert_eq!(&buf[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_number_truncates_high_bits() {
        let mut buf = BytesMut::new();
        encode_number_sized(0x1_0000_0002, 4, &mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 2]);

        let mut buf = BytesMut::new();
        encode_number_sized(0x0102, 1, &mut buf);
        assert_eq!(&buf[..], &[2]);

        let mut buf = BytesMut::new();
        encode_number_sized(7, 10, &mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[tokio::test]
    async fn test_string_roundtrip() {
        let samples: [&[u8]; 4] = [b"", b"hello", "λ-calcul".as_bytes(), &[0, 0xff, 0x80, 10]];
        for s in samples {
            let mut buf = BytesMut::new();
            encode_string(s, &mut buf);
            assert_eq!(buf.len(), 4 + s.len());

            let mut source = BufSource::new(buf.freeze());
            assert_eq!(&decode_string(&mut source).await.unwrap()[..], s);
        }
    }

    #[tokio::test]
    async fn test_negative_length_consumes_no_payload() {
        let mut source = BufSource::new(vec![0xff, 0xff, 0xff, 0xfe, b'a', b'b']);
        let err = decode_string(&mut source).await.unwrap_err();

        assert!(matches!(
            err,
            WireError::Protocol(ProtocolError::NegativeLength { offset: 0, length: -2 })
        ));
        assert_eq!(source.offset(), 4);
        assert_eq!(source.remaining(), 2);
    }

    #[tokio::test]
    async fn test_truncated_source() {
        let mut source = BufSource::new(vec![0, 0, 0, 5, b'a']);
        let err = decode_string(&mut source).await.unwrap_err();
        assert!(matches!(
            err,
            WireError::Protocol(ProtocolError::UnexpectedEnd { offset: 5 })
        ));
    }

    #[test]
    fn test_symbol_carries_trailer() {
        let bytes = encode_to_bytes(&WireValue::symbol("F"));
        let mut expected = vec![9, 0, 0, 0, 1, b'F', 0, 0, 0, 5];
        expected.extend_from_slice(b"SKANK");
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_cons_layout() {
        let bytes = encode_to_bytes(&WireValue::cons(1u32, "x"));
        assert_eq!(
            &bytes[..],
            &[13, 7, 0, 0, 0, 1, 8, 0, 0, 0, 1, b'x']
        );
    }

    #[test]
    fn test_list_matches_nested_cons() {
        let list = encode_to_bytes(&WireValue::list([1u32, 2]));
        let mut expected = BytesMut::new();
        expected.put_slice(&[13, 7, 0, 0, 0, 1]);
        expected.put_slice(&[13, 7, 0, 0, 0, 2]);
        encode_symbol("NIL", &mut expected);
        assert_eq!(list, expected.freeze());
    }

    #[test]
    fn test_long_list_encodes_without_recursion() {
        let count = 100_000u32;
        let list = WireValue::list(0..count);
        let bytes = encode_to_bytes(&list);
        // cons + number per element, then the NIL symbol
        let nil_len = 1 + 4 + 3 + 4 + SYMBOL_TRAILER.len();
        assert_eq!(bytes.len(), count as usize * 6 + nil_len);
    }

    #[tokio::test]
    async fn test_funcall_decodes_elementwise() {
        let mut buf = BytesMut::new();
        encode_funcall(
            &WireValue::symbol("F"),
            &[WireValue::Integer(1), WireValue::from("x")],
            &mut buf,
        );

        let mut source = BufSource::new(buf.freeze());
        assert_eq!(source.read_byte().await.unwrap(), Opcode::Funcall.as_u8());
        assert_eq!(source.read_byte().await.unwrap(), 2);

        assert_eq!(source.read_byte().await.unwrap(), Opcode::Symbol.as_u8());
        assert_eq!(&decode_string(&mut source).await.unwrap()[..], b"F");
        assert_eq!(&decode_string(&mut source).await.unwrap()[..], b"SKANK");

        assert_eq!(source.read_byte().await.unwrap(), Opcode::Number.as_u8());
        assert_eq!(decode_number(&mut source).await.unwrap(), 1);

        assert_eq!(source.read_byte().await.unwrap(), Opcode::String.as_u8());
        assert_eq!(&decode_string(&mut source).await.unwrap()[..], b"x");

        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_funcall_count_wraps_past_255() {
        let args = vec![WireValue::Integer(0); 256];
        let mut buf = BytesMut::new();
        encode_funcall(&WireValue::symbol("F"), &args, &mut buf);
        assert_eq!(buf[0], 6);
        assert_eq!(buf[1], 0);
    }
}
