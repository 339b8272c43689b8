//! Compact self-describing integer codec
//!
//! Foundation for every on-disk record in this subsystem. A non-negative
//! integer `n` is encoded in 1-10 bytes. Reading the encoded bytes as one
//! little-endian integer, the number of trailing zero bits gives the record
//! length: a length marker bit `1 << (len - 1)` is OR-ed below the value,
//! which is stored shifted left by `len`.
//!
//! # Binary Format
//!
//! ```text
//! stored = (n << len) | (1 << (len - 1)),  little-endian, len bytes
//! ```
//!
//! A record of `len` bytes therefore carries `7 * len` value bits
//! (`8 * len` bits minus `len` marker/shift bits): 7 bits in one byte,
//! 14 in two, ... 63 in nine. Ten bytes cover all of `u64`.
//!
//! Signed integers are zig-zag mapped to unsigned before encoding
//! (`n >= 0 -> 2n`, `n < 0 -> 2|n| - 1`). Byte strings are a compact
//! length followed by the raw bytes ([`encode_bytes`] /
//! [`decode_bytes`]); the streaming form of that framing lives in the
//! durability crate's reader/appender layer.
//!
//! # Type codes
//!
//! On-disk records are tagged with a one-byte type code. Even codes are
//! fatal when unknown; odd codes are skippable, their payload prefixed
//! with a compact-encoded length. This lets old readers skip record kinds
//! introduced after they were built.

use thiserror::Error;

/// Maximum encoded length of a `u64` in bytes.
pub const MAX_ENCODED_LENGTH: usize = 10;

/// Decode-side failures of the compact codec.
///
/// `Truncated` is not corruption: it means the input ends mid-record and
/// the caller may rewind and retry once more bytes exist.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    /// The input ends before the record does
    #[error("truncated compact integer")]
    Truncated,

    /// No valid length marker in the first ten bit positions
    #[error("invalid compact length marker")]
    InvalidMarker,

    /// The decoded value does not fit the caller's bound
    #[error("compact value out of range (maximum {max})")]
    OutOfRange {
        /// Largest acceptable value
        max: u64,
    },
}

/// Number of bytes `encode_unsigned` will use for `n`.
pub fn encoded_length(n: u64) -> usize {
    for len in 1..=8 {
        if n >> (7 * len) == 0 {
            return len;
        }
    }
    if n >> 63 == 0 {
        9
    } else {
        10
    }
}

/// Number of bytes `encode_signed` will use for `n`.
pub fn encoded_length_signed(n: i64) -> usize {
    encoded_length(zigzag(n))
}

/// Encode `n` into `buf`, returning the number of bytes written.
pub fn encode_unsigned(n: u64, buf: &mut [u8; MAX_ENCODED_LENGTH]) -> usize {
    let len = encoded_length(n);
    let stored: u128 = ((n as u128) << len) | (1u128 << (len - 1));
    for (i, byte) in buf.iter_mut().take(len).enumerate() {
        *byte = (stored >> (8 * i)) as u8;
    }
    len
}

/// Encode `n` into `buf` via the zig-zag mapping, returning the bytes written.
pub fn encode_signed(n: i64, buf: &mut [u8; MAX_ENCODED_LENGTH]) -> usize {
    encode_unsigned(zigzag(n), buf)
}

/// Record length implied by the first byte, or `None` when the length
/// marker continues into the second byte (first byte is zero).
pub fn length_from_first_byte(first: u8) -> Option<usize> {
    if first != 0 {
        Some(first.trailing_zeros() as usize + 1)
    } else {
        None
    }
}

/// Record length implied by the second byte when the first byte is zero.
pub fn length_from_second_byte(second: u8) -> Result<usize, CompactError> {
    match second.trailing_zeros() {
        0 => Ok(9),
        1 => Ok(10),
        _ => Err(CompactError::InvalidMarker),
    }
}

/// Decode one unsigned integer from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_unsigned(bytes: &[u8]) -> Result<(u64, usize), CompactError> {
    let first = *bytes.first().ok_or(CompactError::Truncated)?;
    let len = match length_from_first_byte(first) {
        Some(len) => len,
        None => {
            let second = *bytes.get(1).ok_or(CompactError::Truncated)?;
            length_from_second_byte(second)?
        }
    };
    if bytes.len() < len {
        return Err(CompactError::Truncated);
    }
    let mut stored = 0u128;
    for (i, byte) in bytes.iter().take(len).enumerate() {
        stored |= (*byte as u128) << (8 * i);
    }
    let value = stored >> len;
    if value > u64::MAX as u128 {
        return Err(CompactError::OutOfRange { max: u64::MAX });
    }
    Ok((value as u64, len))
}

/// Decode one unsigned integer, rejecting values above `max`.
///
/// A too-large value is a format error, treated as corruption by callers;
/// it is never silently clamped.
pub fn decode_unsigned_bounded(bytes: &[u8], max: u64) -> Result<(u64, usize), CompactError> {
    let (value, len) = decode_unsigned(bytes)?;
    if value > max {
        return Err(CompactError::OutOfRange { max });
    }
    Ok((value, len))
}

/// Decode one signed integer from the front of `bytes`.
pub fn decode_signed(bytes: &[u8]) -> Result<(i64, usize), CompactError> {
    let (value, len) = decode_unsigned(bytes)?;
    Ok((unzigzag(value), len))
}

/// Append `payload` to `out` as a compact length followed by the raw bytes.
pub fn encode_bytes(payload: &[u8], out: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_ENCODED_LENGTH];
    let len = encode_unsigned(payload.len() as u64, &mut buf);
    out.extend_from_slice(&buf[..len]);
    out.extend_from_slice(payload);
}

/// Decode one byte string from the front of `bytes`.
///
/// Returns the payload and the total number of bytes consumed, length
/// prefix included. A declared length above `max_length` is a format
/// error; input ending inside the payload is `Truncated`.
pub fn decode_bytes(bytes: &[u8], max_length: u64) -> Result<(&[u8], usize), CompactError> {
    let (length, prefix) = decode_unsigned_bounded(bytes, max_length)?;
    let end = prefix + length as usize;
    let payload = bytes.get(prefix..end).ok_or(CompactError::Truncated)?;
    Ok((payload, end))
}

/// Zig-zag map a signed integer to unsigned: `n >= 0 -> 2n`, `n < 0 -> 2|n| - 1`.
pub fn zigzag(n: i64) -> u64 {
    if n >= 0 {
        (n as u64) << 1
    } else {
        ((n.unsigned_abs() - 1) << 1) | 1
    }
}

/// Inverse of [`zigzag`].
pub fn unzigzag(v: u64) -> i64 {
    if v & 1 == 0 {
        (v >> 1) as i64
    } else {
        -((v >> 1) as i64) - 1
    }
}

/// Whether an unknown record with this type code may be skipped.
///
/// Odd codes are skippable; even codes are fatal when unknown.
pub fn type_code_is_skippable(code: u8) -> bool {
    code & 1 == 1
}
