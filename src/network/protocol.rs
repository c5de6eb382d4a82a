//! Client wire protocol: handshake magic, framing, and the typed
//! query/response layer over the binary message format.
//!
//! Every message on the wire is a `u32` little-endian length prefix followed
//! by that many bytes of a serialized message. The very first bytes sent on
//! a fresh connection are the 4-byte little-endian protocol version magic,
//! before any framed message.

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};
use crate::reql::{Datum, Frame, Term};
use crate::wire::schema::{self, FrameType, QueryType, ResponseType};
use crate::wire::{self, Value, WireMessage};

/// Protocol version magic, sent once per connection before any frame.
pub const VERSION_V0_1: u32 = 0x3f61ba36;

/// Upper bound on a single frame; a larger declared length means the stream
/// is desynchronized.
pub const MAX_MESSAGE_SIZE: u32 = 256 * 1024 * 1024; // 256 MB

/// Prefix `payload` with its little-endian length.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Inbound frame reassembly buffer.
///
/// Bytes arrive from the transport in arbitrary slices; `push` appends them
/// and `next_frame` yields each complete frame in order, leaving partial
/// frames buffered for the next read.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let declared = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if declared > MAX_MESSAGE_SIZE {
            return Err(Error::Protocol(format!(
                "frame of {} bytes exceeds maximum {}",
                declared, MAX_MESSAGE_SIZE
            )));
        }
        let total = 4 + declared as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        self.buf.advance(4);
        let payload = self.buf.split_to(declared as usize);
        Ok(Some(payload.to_vec()))
    }
}

/// Build and serialize a `Query` message.
///
/// `term` is present for START only; `global_optargs` carry the selected
/// database and per-call flags, transmitted only when explicitly set. The
/// token travels as a decimal string.
pub fn encode_query(
    qtype: QueryType,
    token: u64,
    term: Option<&Term>,
    global_optargs: &[(String, Term)],
) -> Result<Vec<u8>> {
    let mut msg = WireMessage::new(&schema::QUERY);
    msg.set(1, Value::Enum(qtype as i32));
    if let Some(term) = term {
        msg.set(2, Value::Message(term.build()?));
    }
    msg.set(3, Value::Str(token.to_string()));
    for (key, val) in global_optargs {
        let mut pair = WireMessage::new(&schema::QUERY_ASSOC_PAIR);
        pair.set(1, Value::Str(key.clone()));
        pair.set(2, Value::Message(val.build()?));
        msg.push(6, Value::Message(pair));
    }
    wire::serialize(&msg)
}

/// A decoded server response.
#[derive(Debug)]
pub struct Response {
    pub rtype: ResponseType,
    pub token: u64,
    pub results: Vec<Datum>,
    pub backtrace: Vec<Frame>,
}

impl Response {
    /// The error message of an error response (its first result datum).
    pub fn error_message(&self) -> String {
        match self.results.first() {
            Some(Datum::String(s)) => s.clone(),
            _ => "unknown server error".to_string(),
        }
    }
}

/// Deserialize and unpack one response frame.
pub fn decode_response(payload: &[u8]) -> Result<Response> {
    let msg = wire::deserialize(&schema::RESPONSE, payload)?;

    let raw_type = msg
        .get_enum(1)?
        .ok_or_else(|| Error::Protocol("Response without a type".into()))?;
    let rtype = ResponseType::from_wire(raw_type)
        .ok_or_else(|| Error::Protocol(format!("unknown response type {}", raw_type)))?;

    let token = msg
        .get_str(2)?
        .ok_or_else(|| Error::Protocol("Response without a token".into()))?
        .parse::<u64>()
        .map_err(|_| Error::Protocol("Response token is not a decimal integer".into()))?;

    let mut results = Vec::new();
    for value in msg.get_all(3) {
        match value {
            Value::Message(datum) => results.push(Datum::from_wire(datum)?),
            other => {
                return Err(Error::Protocol(format!(
                    "Response.response holds non-message {:?}",
                    other
                )))
            }
        }
    }

    let mut backtrace = Vec::new();
    if let Some(bt) = msg.get_message(4)? {
        for value in bt.get_all(1) {
            let frame = match value {
                Value::Message(frame) => frame,
                other => {
                    return Err(Error::Protocol(format!(
                        "Backtrace.frames holds non-message {:?}",
                        other
                    )))
                }
            };
            backtrace.push(decode_frame(frame)?);
        }
    }

    Ok(Response {
        rtype,
        token,
        results,
        backtrace,
    })
}

fn decode_frame(msg: &WireMessage) -> Result<Frame> {
    let raw = msg
        .get_enum(1)?
        .ok_or_else(|| Error::Protocol("Frame without a type".into()))?;
    match FrameType::from_wire(raw) {
        Some(FrameType::Pos) => Ok(Frame::Pos(
            msg.get_int64(2)?
                .ok_or_else(|| Error::Protocol("POS frame without a position".into()))?,
        )),
        Some(FrameType::Opt) => Ok(Frame::Opt(
            msg.get_str(3)?
                .ok_or_else(|| Error::Protocol("OPT frame without a key".into()))?
                .to_string(),
        )),
        None => Err(Error::Protocol(format!("unknown frame type {}", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::r;

    fn response_msg(rtype: ResponseType, token: u64, results: Vec<Datum>) -> Vec<u8> {
        let mut msg = WireMessage::new(&schema::RESPONSE);
        msg.set(1, Value::Enum(rtype as i32));
        msg.set(2, Value::Str(token.to_string()));
        for datum in results {
            msg.push(3, Value::Message(datum.to_wire()));
        }
        wire::serialize(&msg).unwrap()
    }

    #[test]
    fn test_frame_buffer_reassembles_dribbled_bytes() {
        let payload = response_msg(ResponseType::SuccessAtom, 1, vec![Datum::Number(7.0)]);
        let framed = frame(&payload);

        let mut fb = FrameBuffer::new();
        for byte in &framed {
            assert!(fb.next_frame().unwrap().is_none());
            fb.push(std::slice::from_ref(byte));
        }
        assert_eq!(fb.next_frame().unwrap().unwrap(), payload);
        assert!(fb.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_buffer_many_frames_per_read() {
        let a = response_msg(ResponseType::SuccessAtom, 1, vec![]);
        let b = response_msg(ResponseType::SuccessSequence, 2, vec![]);
        let mut bytes = frame(&a);
        bytes.extend_from_slice(&frame(&b));

        let mut fb = FrameBuffer::new();
        fb.push(&bytes);
        assert_eq!(fb.next_frame().unwrap().unwrap(), a);
        assert_eq!(fb.next_frame().unwrap().unwrap(), b);
        assert!(fb.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_buffer_rejects_oversize() {
        let mut fb = FrameBuffer::new();
        fb.push(&u32::MAX.to_le_bytes());
        assert!(fb.next_frame().is_err());
    }

    #[test]
    fn test_query_encode_decode_fields() {
        let term = r::table("t").get("k");
        let bytes = encode_query(
            QueryType::Start,
            42,
            Some(&term),
            &[("db".to_string(), r::db("test"))],
        )
        .unwrap();

        let msg = wire::deserialize(&schema::QUERY, &bytes).unwrap();
        assert_eq!(msg.get_enum(1).unwrap(), Some(QueryType::Start as i32));
        assert_eq!(msg.get_str(3).unwrap(), Some("42"));
        assert!(msg.get_message(2).unwrap().is_some());
        assert_eq!(msg.get_all(6).len(), 1);
    }

    #[test]
    fn test_continue_has_no_term() {
        let bytes = encode_query(QueryType::Continue, 7, None, &[]).unwrap();
        let msg = wire::deserialize(&schema::QUERY, &bytes).unwrap();
        assert_eq!(msg.get_enum(1).unwrap(), Some(QueryType::Continue as i32));
        assert!(msg.get_message(2).unwrap().is_none());
    }

    #[test]
    fn test_response_roundtrip() {
        let payload = response_msg(
            ResponseType::SuccessPartial,
            9,
            vec![Datum::Number(1.0), Datum::Number(2.0)],
        );
        let resp = decode_response(&payload).unwrap();
        assert_eq!(resp.rtype, ResponseType::SuccessPartial);
        assert_eq!(resp.token, 9);
        assert_eq!(resp.results, vec![Datum::Number(1.0), Datum::Number(2.0)]);
        assert!(resp.backtrace.is_empty());
    }

    #[test]
    fn test_response_with_backtrace() {
        let mut bt = WireMessage::new(&schema::BACKTRACE);
        let mut pos = WireMessage::new(&schema::FRAME);
        pos.set(1, Value::Enum(FrameType::Pos as i32));
        pos.set(2, Value::Int64(0));
        bt.push(1, Value::Message(pos));
        let mut opt = WireMessage::new(&schema::FRAME);
        opt.set(1, Value::Enum(FrameType::Opt as i32));
        opt.set(3, Value::Str("index".into()));
        bt.push(1, Value::Message(opt));

        let mut msg = WireMessage::new(&schema::RESPONSE);
        msg.set(1, Value::Enum(ResponseType::RuntimeError as i32));
        msg.set(2, Value::Str("3".into()));
        msg.push(3, Value::Message(Datum::String("boom".into()).to_wire()));
        msg.set(4, Value::Message(bt));

        let resp = decode_response(&wire::serialize(&msg).unwrap()).unwrap();
        assert_eq!(resp.rtype, ResponseType::RuntimeError);
        assert_eq!(resp.error_message(), "boom");
        assert_eq!(
            resp.backtrace,
            vec![Frame::Pos(0), Frame::Opt("index".into())]
        );
    }

    #[test]
    fn test_unknown_response_type_is_error() {
        let mut msg = WireMessage::new(&schema::RESPONSE);
        msg.set(1, Value::Enum(99));
        msg.set(2, Value::Str("1".into()));
        assert!(decode_response(&wire::serialize(&msg).unwrap()).is_err());
    }

    #[test]
    fn test_bad_token_is_protocol_error() {
        let mut msg = WireMessage::new(&schema::RESPONSE);
        msg.set(1, Value::Enum(ResponseType::SuccessAtom as i32));
        msg.set(2, Value::Str("not-a-number".into()));
        assert!(decode_response(&wire::serialize(&msg).unwrap()).is_err());
    }
}
