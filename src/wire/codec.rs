//! Low-level integer and float codec for the wire format.
//!
//! Implements unsigned base-128 varints (little-endian groups, continuation
//! bit 0x80), the zig-zag transform for signed varints, and little-endian
//! fixed-width 32/64-bit values. All arithmetic is done on `u64`/`i64` with
//! explicit casts so wraparound is bit-exact two's complement.
//!
//! Truncated input is always a hard decode error: a continuation bit on the
//! last available byte means the stream is desynchronized and cannot be
//! recovered locally.

use crate::error::{Error, Result};

/// Longest possible encoding of a u64 varint (10 groups of 7 bits).
pub const MAX_VARINT_LEN: usize = 10;

/// Append a base-128 varint to `out`.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Decode a base-128 varint starting at `*pos`, advancing `*pos` past it.
pub fn decode_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| Error::Protocol("truncated varint".into()))?;
        *pos += 1;
        if shift >= 64 {
            return Err(Error::Protocol("varint exceeds 64 bits".into()));
        }
        // The tenth byte may only carry the single remaining bit.
        if shift == 63 && (byte & 0x7e) != 0 {
            return Err(Error::Protocol("varint exceeds 64 bits".into()));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Zig-zag a signed value so small magnitudes encode small.
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Exact inverse of [`zigzag_encode`].
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Append a little-endian fixed 32-bit value.
pub fn encode_fixed32(value: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian fixed 64-bit value.
pub fn encode_fixed64(value: u64, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Decode a little-endian fixed 32-bit value at `*pos`.
pub fn decode_fixed32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| Error::Protocol("truncated fixed32".into()))?
        .try_into()
        .map_err(|_| Error::Protocol("truncated fixed32".into()))?;
    *pos += 4;
    Ok(u32::from_le_bytes(bytes))
}

/// Decode a little-endian fixed 64-bit value at `*pos`.
pub fn decode_fixed64(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let bytes: [u8; 8] = buf
        .get(*pos..*pos + 8)
        .ok_or_else(|| Error::Protocol("truncated fixed64".into()))?
        .try_into()
        .map_err(|_| Error::Protocol("truncated fixed64".into()))?;
    *pos += 8;
    Ok(u64::from_le_bytes(bytes))
}

/// Append an IEEE-754 double as fixed64.
pub fn encode_double(value: f64, out: &mut Vec<u8>) {
    encode_fixed64(value.to_bits(), out);
}

/// Decode an IEEE-754 double from fixed64.
pub fn decode_double(buf: &[u8], pos: &mut usize) -> Result<f64> {
    Ok(f64::from_bits(decode_fixed64(buf, pos)?))
}

/// Append an IEEE-754 float as fixed32.
pub fn encode_float(value: f32, out: &mut Vec<u8>) {
    encode_fixed32(value.to_bits(), out);
}

/// Decode an IEEE-754 float from fixed32.
pub fn decode_float(buf: &[u8], pos: &mut usize) -> Result<f32> {
    Ok(f32::from_bits(decode_fixed32(buf, pos)?))
}
