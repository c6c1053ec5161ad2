//! The attribute value domain shared by every layer of the engine.
//!
//! Three fixed-width types — `INT`, `FLOAT`, `STRING(n)` — with byte layouts
//! that are memcpy-compatible with their in-memory representation. Strings
//! are right-padded with `\0` to their declared attribute length.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Largest string attribute the engine will encode.
pub const MAX_STRING_LEN: usize = 255;

/// A comparison operator recognized by RM file scans and IX index scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    /// Matches every record/entry; used when no predicate is pushed down.
    NoOp,
}

impl CompOp {
    /// Evaluate `lhs <op> rhs` given a pre-computed ordering of `lhs` vs. `rhs`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompOp::Eq => ordering == Ordering::Equal,
            CompOp::Lt => ordering == Ordering::Less,
            CompOp::Le => ordering != Ordering::Greater,
            CompOp::Gt => ordering == Ordering::Greater,
            CompOp::Ge => ordering != Ordering::Less,
            CompOp::Ne => ordering != Ordering::Equal,
            CompOp::NoOp => true,
        }
    }
}

/// Declared, fixed-width type of a table attribute.
///
/// `Str(n)` carries the declared length in bytes (1..=`MAX_STRING_LEN`);
/// it is part of the type so that encode/decode and comparisons both know
/// how many bytes a value occupies on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    Int,
    Float,
    Str(u16),
}

/// Errors raised while encoding, decoding, or type-checking a `Value`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("value {0} does not match declared attribute type {1:?}")]
    TypeMismatch(&'static str, AttrType),
    #[error("string attribute length must be in 1..={MAX_STRING_LEN}, got {0}")]
    InvalidStringLength(u16),
    #[error("encode buffer has {have} bytes, attribute needs {need}")]
    BufferTooSmall { have: usize, need: usize },
    #[error("string value has {0} bytes, longer than declared length {1}")]
    StringTooLong(usize, u16),
}

impl AttrType {
    /// On-disk width in bytes of a value of this type.
    pub fn width(&self) -> usize {
        match self {
            AttrType::Int => 4,
            AttrType::Float => 4,
            AttrType::Str(len) => *len as usize,
        }
    }

    pub fn new_string(len: u16) -> Result<Self, TypeError> {
        if len == 0 || len as usize > MAX_STRING_LEN {
            return Err(TypeError::InvalidStringLength(len));
        }
        Ok(AttrType::Str(len))
    }
}

/// A typed attribute value.
///
/// `Null` forces any predicate comparing against it to behave as
/// [`CompOp::NoOp`]: a null right-hand side can never participate in a
/// comparison, so file/index scans holding one simply return everything.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
    Null,
}

impl Value {
    /// Returns whether this value could be encoded as the given attribute type.
    pub fn matches(&self, attr: &AttrType) -> bool {
        matches!(
            (self, attr),
            (Value::Int(_), AttrType::Int)
                | (Value::Float(_), AttrType::Float)
                | (Value::Str(_), AttrType::Str(_))
                | (Value::Null, _)
        )
    }

    /// Encode this value into `buf`, which must be exactly `attr.width()` bytes.
    pub fn encode_into(&self, attr: &AttrType, buf: &mut [u8]) -> Result<(), TypeError> {
        let need = attr.width();
        if buf.len() != need {
            return Err(TypeError::BufferTooSmall {
                have: buf.len(),
                need,
            });
        }
        match (self, attr) {
            (Value::Int(v), AttrType::Int) => buf.copy_from_slice(&v.to_ne_bytes()),
            (Value::Float(v), AttrType::Float) => buf.copy_from_slice(&v.to_ne_bytes()),
            (Value::Str(s), AttrType::Str(len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *len as usize {
                    return Err(TypeError::StringTooLong(bytes.len(), *len));
                }
                buf.fill(0);
                buf[..bytes.len()].copy_from_slice(bytes);
            }
            (Value::Null, _) => buf.fill(0),
            _ => return Err(TypeError::TypeMismatch(self.kind_name(), *attr)),
        }
        Ok(())
    }

    /// Decode a value of the given attribute type out of `bytes`.
    pub fn decode(attr: &AttrType, bytes: &[u8]) -> Result<Value, TypeError> {
        let need = attr.width();
        if bytes.len() != need {
            return Err(TypeError::BufferTooSmall {
                have: bytes.len(),
                need,
            });
        }
        Ok(match attr {
            AttrType::Int => Value::Int(i32::from_ne_bytes(bytes.try_into().unwrap())),
            AttrType::Float => Value::Float(f32::from_ne_bytes(bytes.try_into().unwrap())),
            AttrType::Str(_) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = String::from_utf8_lossy(&bytes[..end]).into_owned();
                Value::Str(s)
            }
        })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "INT",
            Value::Float(_) => "FLOAT",
            Value::Str(_) => "STRING",
            Value::Null => "NULL",
        }
    }

    /// Compare two values of the same declared type. `Null` never compares —
    /// callers must force `CompOp::NoOp` when either side is null.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            // `total_cmp` rather than `partial_cmp`: NaN is a valid f32 and
            // must still order consistently (as the largest value, by IEEE
            // 754 total-order convention) instead of comparing as unordered.
            (Value::Float(a), Value::Float(b)) => Some(a.total_cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn int_roundtrip_preserves_negative_values() {
        let attr = AttrType::Int;
        let mut buf = [0u8; 4];
        Value::Int(-42).encode_into(&attr, &mut buf).unwrap();
        assert_eq!(Value::decode(&attr, &buf).unwrap(), Value::Int(-42));
    }

    #[test]
    fn string_padding_and_truncated_decode() {
        let attr = AttrType::Str(8);
        let mut buf = [0u8; 8];
        Value::Str("hi".into()).encode_into(&attr, &mut buf).unwrap();
        assert_eq!(&buf, b"hi\0\0\0\0\0\0");
        assert_eq!(Value::decode(&attr, &buf).unwrap(), Value::Str("hi".into()));
    }

    #[test]
    fn string_too_long_rejected() {
        let attr = AttrType::Str(2);
        let mut buf = [0u8; 2];
        assert!(Value::Str("abc".into())
            .encode_into(&attr, &mut buf)
            .is_err());
    }

    #[test]
    fn comp_op_holds_matches_ordering() {
        assert!(CompOp::Lt.holds(Ordering::Less));
        assert!(!CompOp::Lt.holds(Ordering::Equal));
        assert!(CompOp::Ge.holds(Ordering::Equal));
        assert!(CompOp::Ne.holds(Ordering::Less));
        assert!(CompOp::NoOp.holds(Ordering::Greater));
    }

    #[test]
    fn null_never_compares() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).compare(&Value::Null), None);
    }

    proptest! {
        #[test]
        fn int_roundtrip_prop(v in any::<i32>()) {
            let attr = AttrType::Int;
            let mut buf = [0u8; 4];
            Value::Int(v).encode_into(&attr, &mut buf).unwrap();
            prop_assert_eq!(Value::decode(&attr, &buf).unwrap(), Value::Int(v));
        }

        #[test]
        fn string_roundtrip_prop(s in "[a-zA-Z0-9]{0,16}") {
            let attr = AttrType::Str(16);
            let mut buf = [0u8; 16];
            Value::Str(s.clone()).encode_into(&attr, &mut buf).unwrap();
            prop_assert_eq!(Value::decode(&attr, &buf).unwrap(), Value::Str(s));
        }
    }
}
