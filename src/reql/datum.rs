//! Datum - the driver's JSON-like value type.
//!
//! A `Datum` represents any value that can be sent to or received from the
//! server: null, booleans, f64 numbers, UTF-8 strings, arrays and objects.
//! It is JSON-compatible via serde and converts losslessly to and from the
//! wire `Datum` message.
//!
//! Objects use a `BTreeMap` so wire encoding and query printing are
//! deterministic regardless of construction order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wire::schema::{self, DatumType};
use crate::wire::{Value, WireMessage};

/// A value stored or manipulated by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<Datum>),
    Object(BTreeMap<String, Datum>),
}

impl Datum {
    /// Check if datum is null
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&Vec<Datum>> {
        match self {
            Datum::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Datum::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// True for null/bool/number/string; arrays and objects are composite.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Datum::Array(_) | Datum::Object(_))
    }

    /// Encode into a wire `Datum` message.
    pub fn to_wire(&self) -> WireMessage {
        let mut msg = WireMessage::new(&schema::DATUM);
        match self {
            Datum::Null => {
                msg.set(1, Value::Enum(DatumType::Null as i32));
            }
            Datum::Boolean(b) => {
                msg.set(1, Value::Enum(DatumType::Bool as i32));
                msg.set(2, Value::Bool(*b));
            }
            Datum::Number(n) => {
                msg.set(1, Value::Enum(DatumType::Num as i32));
                msg.set(3, Value::Double(*n));
            }
            Datum::String(s) => {
                msg.set(1, Value::Enum(DatumType::Str as i32));
                msg.set(4, Value::Str(s.clone()));
            }
            Datum::Array(items) => {
                msg.set(1, Value::Enum(DatumType::Array as i32));
                for item in items {
                    msg.push(5, Value::Message(item.to_wire()));
                }
            }
            Datum::Object(entries) => {
                msg.set(1, Value::Enum(DatumType::Object as i32));
                for (key, val) in entries {
                    let mut pair = WireMessage::new(&schema::DATUM_ASSOC_PAIR);
                    pair.set(1, Value::Str(key.clone()));
                    pair.set(2, Value::Message(val.to_wire()));
                    msg.push(6, Value::Message(pair));
                }
            }
        }
        msg
    }

    /// Decode from a wire `Datum` message.
    pub fn from_wire(msg: &WireMessage) -> Result<Self> {
        let raw = msg
            .get_enum(1)?
            .ok_or_else(|| Error::Protocol("Datum without a type".into()))?;
        let dtype = DatumType::from_wire(raw)
            .ok_or_else(|| Error::Protocol(format!("unknown Datum type {}", raw)))?;

        Ok(match dtype {
            DatumType::Null => Datum::Null,
            DatumType::Bool => Datum::Boolean(
                msg.get_bool(2)?
                    .ok_or_else(|| Error::Protocol("bool Datum without r_bool".into()))?,
            ),
            DatumType::Num => Datum::Number(
                msg.get_double(3)?
                    .ok_or_else(|| Error::Protocol("num Datum without r_num".into()))?,
            ),
            DatumType::Str => Datum::String(
                msg.get_str(4)?
                    .ok_or_else(|| Error::Protocol("str Datum without r_str".into()))?
                    .to_string(),
            ),
            DatumType::Array => {
                let mut items = Vec::new();
                for value in msg.get_all(5) {
                    match value {
                        Value::Message(item) => items.push(Datum::from_wire(item)?),
                        other => {
                            return Err(Error::Protocol(format!(
                                "Datum.r_array holds non-message {:?}",
                                other
                            )))
                        }
                    }
                }
                Datum::Array(items)
            }
            DatumType::Object => {
                let mut entries = BTreeMap::new();
                for value in msg.get_all(6) {
                    let pair = match value {
                        Value::Message(pair) => pair,
                        other => {
                            return Err(Error::Protocol(format!(
                                "Datum.r_object holds non-message {:?}",
                                other
                            )))
                        }
                    };
                    let key = pair
                        .get_str(1)?
                        .ok_or_else(|| Error::Protocol("AssocPair without key".into()))?
                        .to_string();
                    let val = pair
                        .get_message(2)?
                        .ok_or_else(|| Error::Protocol("AssocPair without value".into()))?;
                    entries.insert(key, Datum::from_wire(val)?);
                }
                Datum::Object(entries)
            }
        })
    }
}

// Conversions
impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Boolean(b)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Number(n as f64)
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Datum::Number(n as f64)
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Datum::Number(n)
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(items: Vec<T>) -> Self {
        Datum::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Datum {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Datum::Null,
            serde_json::Value::Bool(b) => Datum::Boolean(b),
            serde_json::Value::Number(n) => Datum::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Datum::String(s),
            serde_json::Value::Array(arr) => {
                Datum::Array(arr.into_iter().map(Datum::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Datum::Object(obj.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

impl From<Datum> for serde_json::Value {
    fn from(datum: Datum) -> Self {
        match datum {
            Datum::Null => serde_json::Value::Null,
            Datum::Boolean(b) => serde_json::Value::Bool(b),
            Datum::Number(n) => {
                // Integral values in i64 range come back as JSON integers so
                // a number survives a JSON round trip unchanged.
                let number = if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
                    serde_json::Number::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n)
                        .unwrap_or_else(|| serde_json::Number::from(0))
                };
                serde_json::Value::Number(number)
            }
            Datum::String(s) => serde_json::Value::String(s),
            Datum::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(serde_json::Value::from).collect())
            }
            Datum::Object(obj) => serde_json::Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null => write!(f, "null"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Number(n) => write!(f, "{}", n),
            Datum::String(s) => write!(f, "\"{}\"", s),
            Datum::Array(arr) => {
                write!(f, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Datum::Object(obj) => {
                write!(f, "{{")?;
                for (i, (key, value)) in obj.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
