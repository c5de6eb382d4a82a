//! Wire serializer and deserializer.
//!
//! Serialization walks a message's descriptor in tag order and emits each
//! present field as a `varint((tag << 3) | wire_type)` key followed by the
//! value encoding for the field's wire type. Deserialization reads keys until
//! the input is exhausted; unknown tags are consumed per their wire type and
//! discarded so the stream stays synchronized, never a fatal error. Truncated
//! values and group wire types are fatal.

use crate::error::{Error, Result};

use super::codec;
use super::message::{FieldDescriptor, FieldKind, MessageDescriptor, Value, WireMessage, WireType};

/// Serialize a message into its wire byte representation.
pub fn serialize(message: &WireMessage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    serialize_into(message, &mut out)?;
    Ok(out)
}

fn serialize_into(message: &WireMessage, out: &mut Vec<u8>) -> Result<()> {
    // Descriptor tag order, not insertion order.
    for field in message.descriptor().fields {
        for value in message.get_all(field.tag) {
            emit_field(message.descriptor(), field, value, out)?;
        }
    }
    Ok(())
}

fn emit_field(
    desc: &MessageDescriptor,
    field: &FieldDescriptor,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<()> {
    let wire_type = field.kind.wire_type();
    if matches!(wire_type, WireType::StartGroup | WireType::EndGroup) {
        return Err(Error::Protocol(format!(
            "{}.{}: group wire types are unsupported",
            desc.name, field.name
        )));
    }
    codec::encode_varint(((field.tag as u64) << 3) | wire_type as u64, out);

    let mismatch = || {
        Error::Protocol(format!(
            "{}.{}: value {:?} does not match field kind {:?}",
            desc.name, field.name, value, field.kind
        ))
    };

    match (&field.kind, value) {
        (FieldKind::Int32, Value::Int32(v)) => codec::encode_varint(*v as i64 as u64, out),
        (FieldKind::Int64, Value::Int64(v)) => codec::encode_varint(*v as u64, out),
        (FieldKind::Uint32, Value::Uint32(v)) => codec::encode_varint(*v as u64, out),
        (FieldKind::Uint64, Value::Uint64(v)) => codec::encode_varint(*v, out),
        (FieldKind::Sint32, Value::Int32(v)) => {
            codec::encode_varint(codec::zigzag_encode(*v as i64), out)
        }
        (FieldKind::Sint64, Value::Int64(v)) => {
            codec::encode_varint(codec::zigzag_encode(*v), out)
        }
        (FieldKind::Bool, Value::Bool(v)) => codec::encode_varint(*v as u64, out),
        (FieldKind::Enum, Value::Enum(v)) => codec::encode_varint(*v as i64 as u64, out),
        (FieldKind::Fixed64, Value::Uint64(v)) => codec::encode_fixed64(*v, out),
        (FieldKind::Sfixed64, Value::Int64(v)) => codec::encode_fixed64(*v as u64, out),
        (FieldKind::Double, Value::Double(v)) => codec::encode_double(*v, out),
        (FieldKind::Fixed32, Value::Uint32(v)) => codec::encode_fixed32(*v, out),
        (FieldKind::Sfixed32, Value::Int32(v)) => codec::encode_fixed32(*v as u32, out),
        (FieldKind::Float, Value::Float(v)) => codec::encode_float(*v, out),
        (FieldKind::String, Value::Str(s)) => {
            codec::encode_varint(s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
        }
        (FieldKind::Bytes, Value::Bytes(b)) => {
            codec::encode_varint(b.len() as u64, out);
            out.extend_from_slice(b);
        }
        (FieldKind::Message(_), Value::Message(m)) => {
            let nested = serialize(m)?;
            codec::encode_varint(nested.len() as u64, out);
            out.extend_from_slice(&nested);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Deserialize `buf` as one message of the given type.
pub fn deserialize(descriptor: &'static MessageDescriptor, buf: &[u8]) -> Result<WireMessage> {
    let mut message = WireMessage::new(descriptor);
    let mut pos = 0;

    while pos < buf.len() {
        let key = codec::decode_varint(buf, &mut pos)?;
        let tag = (key >> 3) as u32;
        let wire_type = WireType::from_key_bits(key & 0x7)?;

        if tag == 0 {
            // Tag 0 is reserved for message metadata and never valid on the wire.
            return Err(Error::Protocol(format!(
                "{}: field key with reserved tag 0",
                descriptor.name
            )));
        }
        if matches!(wire_type, WireType::StartGroup | WireType::EndGroup) {
            return Err(Error::Protocol(format!(
                "{}: group wire types are unsupported",
                descriptor.name
            )));
        }

        match descriptor.field(tag) {
            None => skip_value(descriptor, buf, &mut pos, wire_type)?,
            Some(field) => {
                if field.kind.wire_type() != wire_type {
                    return Err(Error::Protocol(format!(
                        "{}.{}: wire type {:?} does not match declared kind {:?}",
                        descriptor.name, field.name, wire_type, field.kind
                    )));
                }
                let value = read_value(field, buf, &mut pos)?;
                if field.repeated {
                    message.push(tag, value);
                } else {
                    message.set(tag, value);
                }
            }
        }
    }

    Ok(message)
}

/// Consume an unknown field's bytes per its wire type.
fn skip_value(
    descriptor: &MessageDescriptor,
    buf: &[u8],
    pos: &mut usize,
    wire_type: WireType,
) -> Result<()> {
    match wire_type {
        WireType::Varint => {
            codec::decode_varint(buf, pos)?;
        }
        WireType::Fixed64 => {
            codec::decode_fixed64(buf, pos)?;
        }
        WireType::Fixed32 => {
            codec::decode_fixed32(buf, pos)?;
        }
        WireType::LengthDelimited => {
            let len = codec::decode_varint(buf, pos)? as usize;
            if buf.len() - *pos < len {
                return Err(Error::Protocol(format!(
                    "{}: truncated unknown field",
                    descriptor.name
                )));
            }
            *pos += len;
        }
        WireType::StartGroup | WireType::EndGroup => {
            return Err(Error::Protocol(format!(
                "{}: group wire types are unsupported",
                descriptor.name
            )));
        }
    }
    Ok(())
}

fn read_value(field: &FieldDescriptor, buf: &[u8], pos: &mut usize) -> Result<Value> {
    Ok(match field.kind {
        FieldKind::Int32 => Value::Int32(codec::decode_varint(buf, pos)? as i32),
        FieldKind::Int64 => Value::Int64(codec::decode_varint(buf, pos)? as i64),
        FieldKind::Uint32 => Value::Uint32(codec::decode_varint(buf, pos)? as u32),
        FieldKind::Uint64 => Value::Uint64(codec::decode_varint(buf, pos)?),
        FieldKind::Sint32 => {
            Value::Int32(codec::zigzag_decode(codec::decode_varint(buf, pos)?) as i32)
        }
        FieldKind::Sint64 => Value::Int64(codec::zigzag_decode(codec::decode_varint(buf, pos)?)),
        FieldKind::Bool => Value::Bool(codec::decode_varint(buf, pos)? != 0),
        FieldKind::Enum => Value::Enum(codec::decode_varint(buf, pos)? as i32),
        FieldKind::Fixed64 => Value::Uint64(codec::decode_fixed64(buf, pos)?),
        FieldKind::Sfixed64 => Value::Int64(codec::decode_fixed64(buf, pos)? as i64),
        FieldKind::Double => Value::Double(codec::decode_double(buf, pos)?),
        FieldKind::Fixed32 => Value::Uint32(codec::decode_fixed32(buf, pos)?),
        FieldKind::Sfixed32 => Value::Int32(codec::decode_fixed32(buf, pos)? as i32),
        FieldKind::Float => Value::Float(codec::decode_float(buf, pos)?),
        FieldKind::String => {
            let bytes = read_length_delimited(buf, pos)?;
            Value::Str(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string field: {}", e)))?,
            )
        }
        FieldKind::Bytes => Value::Bytes(read_length_delimited(buf, pos)?.to_vec()),
        FieldKind::Message(nested) => {
            let bytes = read_length_delimited(buf, pos)?;
            Value::Message(deserialize(nested, bytes)?)
        }
    })
}

fn read_length_delimited<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = codec::decode_varint(buf, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::Protocol("truncated length-delimited value".into()))?;
    let bytes = &buf[*pos..end];
    *pos = end;
    Ok(bytes)
}
