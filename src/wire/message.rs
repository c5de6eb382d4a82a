//! Descriptor-driven wire message model.
//!
//! A message type is described once by a static [`MessageDescriptor`]: an
//! ordered list of numbered, typed fields. Instances are [`WireMessage`]
//! values storing field values keyed by tag. Tags are stable, numeric, and
//! never reused for a different type within one message type; repeated fields
//! store an ordered list, singular fields store zero or one value.
//!
//! Tag 0 is reserved for message-level metadata (the descriptor name) and
//! never appears in the wire encoding.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Wire-level encoding of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    /// Recover a wire type from the low three bits of a field key.
    pub fn from_key_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(Error::Protocol(format!("invalid wire type {}", bits))),
        }
    }
}

/// Semantic type of a field, mapped onto exactly one wire type.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Bool,
    Enum,
    Fixed64,
    Sfixed64,
    Double,
    Fixed32,
    Sfixed32,
    Float,
    String,
    Bytes,
    Message(&'static MessageDescriptor),
}

impl FieldKind {
    /// The wire type this kind encodes as.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Uint32
            | FieldKind::Uint64
            | FieldKind::Sint32
            | FieldKind::Sint64
            | FieldKind::Bool
            | FieldKind::Enum => WireType::Varint,
            FieldKind::Fixed64 | FieldKind::Sfixed64 | FieldKind::Double => WireType::Fixed64,
            FieldKind::Fixed32 | FieldKind::Sfixed32 | FieldKind::Float => WireType::Fixed32,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message(_) => {
                WireType::LengthDelimited
            }
        }
    }
}

/// One numbered field of a message type.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub tag: u32,
    pub name: &'static str,
    pub kind: FieldKind,
    pub repeated: bool,
}

/// A message type: its name plus the tag-ordered field list.
#[derive(Debug)]
pub struct MessageDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl MessageDescriptor {
    /// Look up a field by tag number.
    pub fn field(&self, tag: u32) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Look up a field by name (used by tests and debug output).
    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    Enum(i32),
    Double(f64),
    Float(f32),
    Str(String),
    Bytes(Vec<u8>),
    Message(WireMessage),
}

/// One structured wire value: a descriptor plus a per-tag value store.
///
/// Singular fields hold at most one entry in their slot; repeated fields hold
/// an ordered list. Absent fields simply have no slot, which keeps the
/// absent-vs-default distinction.
#[derive(Debug, Clone)]
pub struct WireMessage {
    descriptor: &'static MessageDescriptor,
    fields: BTreeMap<u32, Vec<Value>>,
}

impl PartialEq for WireMessage {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.descriptor, other.descriptor) && self.fields == other.fields
    }
}

impl WireMessage {
    pub fn new(descriptor: &'static MessageDescriptor) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
        }
    }

    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Set a singular field, replacing any previous value.
    pub fn set(&mut self, tag: u32, value: Value) -> &mut Self {
        self.fields.insert(tag, vec![value]);
        self
    }

    /// Append one value to a repeated field.
    pub fn push(&mut self, tag: u32, value: Value) -> &mut Self {
        self.fields.entry(tag).or_default().push(value);
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, tag: u32, value: Value) -> Self {
        self.set(tag, value);
        self
    }

    /// First (or only) value of a field.
    pub fn get(&self, tag: u32) -> Option<&Value> {
        self.fields.get(&tag).and_then(|vs| vs.first())
    }

    /// All values of a repeated field, in insertion order.
    pub fn get_all(&self, tag: u32) -> &[Value] {
        self.fields.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, tag: u32) -> bool {
        self.fields.contains_key(&tag)
    }

    /// Tags that currently hold at least one value.
    pub fn present_tags(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.keys().copied()
    }

    // Typed accessors used when unpacking responses. Each fails with a
    // protocol error if the field holds a different value shape.

    pub fn get_enum(&self, tag: u32) -> Result<Option<i32>> {
        match self.get(tag) {
            None => Ok(None),
            Some(Value::Enum(v)) => Ok(Some(*v)),
            Some(other) => Err(self.type_error(tag, "enum", other)),
        }
    }

    pub fn get_str(&self, tag: u32) -> Result<Option<&str>> {
        match self.get(tag) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(other) => Err(self.type_error(tag, "string", other)),
        }
    }

    pub fn get_bool(&self, tag: u32) -> Result<Option<bool>> {
        match self.get(tag) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.type_error(tag, "bool", other)),
        }
    }

    pub fn get_double(&self, tag: u32) -> Result<Option<f64>> {
        match self.get(tag) {
            None => Ok(None),
            Some(Value::Double(d)) => Ok(Some(*d)),
            Some(other) => Err(self.type_error(tag, "double", other)),
        }
    }

    pub fn get_int64(&self, tag: u32) -> Result<Option<i64>> {
        match self.get(tag) {
            None => Ok(None),
            Some(Value::Int64(v)) => Ok(Some(*v)),
            Some(other) => Err(self.type_error(tag, "int64", other)),
        }
    }

    pub fn get_message(&self, tag: u32) -> Result<Option<&WireMessage>> {
        match self.get(tag) {
            None => Ok(None),
            Some(Value::Message(m)) => Ok(Some(m)),
            Some(other) => Err(self.type_error(tag, "message", other)),
        }
    }

    fn type_error(&self, tag: u32, want: &str, got: &Value) -> Error {
        let name = self
            .descriptor
            .field(tag)
            .map(|f| f.name)
            .unwrap_or("<unknown>");
        Error::Protocol(format!(
            "{}.{}: expected {}, found {:?}",
            self.descriptor.name, name, want, got
        ))
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.descriptor.name)?;
        for field in self.descriptor.fields {
            let values = self.get_all(field.tag);
            for value in values {
                write!(f, " {}: {:?}", field.name, value)?;
            }
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PAIR: MessageDescriptor = MessageDescriptor {
        name: "Pair",
        fields: &[
            FieldDescriptor {
                tag: 1,
                name: "key",
                kind: FieldKind::String,
                repeated: false,
            },
            FieldDescriptor {
                tag: 2,
                name: "val",
                kind: FieldKind::Int64,
                repeated: false,
            },
        ],
    };

    #[test]
    fn test_singular_overwrite() {
        let mut msg = WireMessage::new(&PAIR);
        msg.set(1, Value::Str("a".into()));
        msg.set(1, Value::Str("b".into()));
        assert_eq!(msg.get_str(1).unwrap(), Some("b"));
        assert_eq!(msg.get_all(1).len(), 1);
    }

    #[test]
    fn test_repeated_order() {
        let mut msg = WireMessage::new(&PAIR);
        msg.push(2, Value::Int64(1));
        msg.push(2, Value::Int64(2));
        msg.push(2, Value::Int64(3));
        assert_eq!(
            msg.get_all(2),
            &[Value::Int64(1), Value::Int64(2), Value::Int64(3)]
        );
    }

    #[test]
    fn test_absent_vs_default() {
        let mut msg = WireMessage::new(&PAIR);
        assert!(!msg.has(2));
        msg.set(2, Value::Int64(0));
        assert!(msg.has(2));
    }

    #[test]
    fn test_typed_accessor_mismatch() {
        let mut msg = WireMessage::new(&PAIR);
        msg.set(1, Value::Int64(7));
        assert!(msg.get_str(1).is_err());
    }

    #[test]
    fn test_descriptor_lookup() {
        assert_eq!(PAIR.field(1).unwrap().name, "key");
        assert!(PAIR.field(9).is_none());
        assert_eq!(PAIR.field_by_name("val").unwrap().tag, 2);
    }
}
