//! Binary wire format for the PhotonDB client protocol.
//!
//! The protocol encodes every message as a sequence of tagged fields in the
//! classic base-128 style:
//!
//! - **codec**: varint / zig-zag / fixed-width primitives
//! - **message**: descriptor-driven message model (tags, field kinds, values)
//! - **serialize**: descriptor walk that turns messages into bytes and back
//! - **schema**: the static descriptors for Query, Response, Term, Datum,
//!   Backtrace and Frame
//!
//! Messages are short-lived: a `WireMessage` exists only for the duration of
//! one request/response exchange and is unpacked into driver-native values as
//! soon as it is decoded.

pub mod codec;
pub mod message;
pub mod schema;
pub mod serialize;

pub use message::{FieldDescriptor, FieldKind, MessageDescriptor, Value, WireMessage, WireType};
pub use serialize::{deserialize, serialize};
