//! Values that can be sent to the eval server, and the reply it sends back.

use bytes::Bytes;
use serde_json::Value;
use std::borrow::Cow;

use crate::error::WireError;

/// Symbol terminating a right-nested list
pub const NIL: &str = "NIL";

/// A value with a wire encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    /// Unsigned, 4 bytes on the wire
    Integer(u32),
    /// Opaque bytes, not necessarily UTF-8
    String(Bytes),
    /// Symbol name, sent as given
    Symbol(String),
    /// Ordered pair (head, tail)
    Cons(Box<WireValue>, Box<WireValue>),
}

impl WireValue {
    pub fn symbol(name: impl Into<String>) -> Self {
        WireValue::Symbol(name.into())
    }

    pub fn cons(head: impl Into<WireValue>, tail: impl Into<WireValue>) -> Self {
        WireValue::Cons(Box::new(head.into()), Box::new(tail.into()))
    }

    pub fn nil() -> Self {
        WireValue::Symbol(NIL.to_string())
    }

    /// Build a proper list: right-nested conses ending in `NIL`
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::IntoIter: DoubleEndedIterator,
        I::Item: Into<WireValue>,
    {
        items
            .into_iter()
            .rev()
            .fold(WireValue::nil(), |tail, head| WireValue::cons(head, tail))
    }

    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Integer(_) => "integer",
            WireValue::String(_) => "string",
            WireValue::Symbol(_) => "symbol",
            WireValue::Cons(..) => "cons",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, WireValue::Symbol(name) if name == NIL)
    }
}

// Unlink the tail chain in a loop; the derived drop would recurse once per
// list element.
impl Drop for WireValue {
    fn drop(&mut self) {
        let mut next = match self {
            WireValue::Cons(_, tail) => std::mem::replace(&mut **tail, WireValue::Integer(0)),
            _ => return,
        };
        while let WireValue::Cons(_, tail) = &mut next {
            let rest = std::mem::replace(&mut **tail, WireValue::Integer(0));
            next = rest;
        }
    }
}

impl From<u32> for WireValue {
    fn from(n: u32) -> Self {
        WireValue::Integer(n)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::String(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::String(Bytes::from(s))
    }
}

impl From<Bytes> for WireValue {
    fn from(b: Bytes) -> Self {
        WireValue::String(b)
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(b: Vec<u8>) -> Self {
        WireValue::String(Bytes::from(b))
    }
}

/// JSON carries kinds the wire has no encoding for, so this is where
/// `UnsupportedType` comes from.
impl TryFrom<&Value> for WireValue {
    type Error = WireError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(WireValue::nil()),
            Value::String(s) => Ok(WireValue::from(s.as_str())),
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(WireValue::Integer)
                .ok_or_else(|| WireError::UnsupportedType {
                    kind: format!("number {}", n),
                }),
            Value::Array(items) => {
                let items = items
                    .iter()
                    .map(WireValue::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(WireValue::list(items))
            }
            Value::Bool(_) => Err(WireError::UnsupportedType {
                kind: "boolean".to_string(),
            }),
            Value::Object(_) => Err(WireError::UnsupportedType {
                kind: "object".to_string(),
            }),
        }
    }
}

/// Reply to an evaluation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code reported by the server
    pub status: u32,
    /// Condition text, empty when evaluation succeeded
    pub condition: Bytes,
    /// Printed representation of the result
    pub result: Bytes,
}

impl Reply {
    pub fn condition_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.condition)
    }

    pub fn result_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.result)
    }

    /// Whether the server signalled a condition
    pub fn is_error(&self) -> bool {
        !self.condition.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_is_right_nested() {
        let list = WireValue::list([1u32, 2]);
        assert_eq!(
            list,
            WireValue::cons(1u32, WireValue::cons(2u32, WireValue::nil()))
        );
        assert!(WireValue::list(Vec::<u32>::new()).is_nil());
    }

    #[test]
    fn test_from_json() {
        let value = WireValue::try_from(&json!(["a", 7, null])).unwrap();
        assert_eq!(
            value,
            WireValue::list([
                WireValue::from("a"),
                WireValue::Integer(7),
                WireValue::nil(),
            ])
        );
    }

    #[test]
    fn test_from_json_rejects_unencodable() {
        for bad in [json!(-1), json!(1.5), json!(true), json!({"k": 1}), json!(5_000_000_000u64)] {
            let err = WireValue::try_from(&bad).unwrap_err();
            assert!(matches!(err, WireError::UnsupportedType { .. }), "{:?}", bad);
        }
        // Nested failures surface too
        assert!(WireValue::try_from(&json!([1, [false]])).is_err());
    }

    #[test]
    fn test_reply_text() {
        let reply = Reply {
            status: 0,
            condition: Bytes::new(),
            result: Bytes::from_static(b"42"),
        };
        assert!(!reply.is_error());
        assert_eq!(reply.result_text(), "42");
        assert_eq!(reply.condition_text(), "");
    }
}
