//! # Coding - binary encoding primitives
//!
//! Every on-disk and in-memory format in ShoalKV is built from three
//! primitives:
//!
//! ```text
//! fixed32 / fixed64   little-endian, regardless of host byte order
//! varint32 / varint64 7 payload bits per byte, low group first,
//!                     high bit set on every byte except the last
//! length-prefixed     varint32(len) followed by `len` raw bytes
//! ```
//!
//! Encoders never fail. Decoders never panic: an exhausted buffer, an
//! over-long varint, or a length prefix that points past the end of the
//! input all come back as a [`CodingError`].
//!
//! ## Example
//!
//! ```rust
//! use coding::{put_length_prefixed_slice, get_length_prefixed_slice};
//!
//! let mut buf = Vec::new();
//! put_length_prefixed_slice(&mut buf, b"hello");
//!
//! let mut input = &buf[..];
//! assert_eq!(get_length_prefixed_slice(&mut input).unwrap(), b"hello");
//! assert!(input.is_empty());
//! ```

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Largest number of bytes a varint32 can occupy.
pub const MAX_VARINT32_LEN: usize = 5;

/// Largest number of bytes a varint64 can occupy.
pub const MAX_VARINT64_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;

/// Errors produced while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodingError {
    /// The input ended before a fixed-width value or a varint was complete.
    #[error("buffer exhausted: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A varint carried more significant bits than its target width.
    #[error("varint overflows {bits} bits")]
    VarintOverflow { bits: u32 },

    /// A length prefix announced more bytes than remain in the input.
    #[error("length prefix {len} exceeds remaining {remaining} bytes")]
    LengthOverrun { len: usize, remaining: usize },
}

// -------------------- Fixed width --------------------

/// Writes `value` into the first 4 bytes of `dst`.
///
/// # Panics
///
/// Panics if `dst` is shorter than 4 bytes. Callers size the buffer first.
#[inline]
pub fn encode_fixed32(dst: &mut [u8], value: u32) {
    LittleEndian::write_u32(dst, value);
}

/// Writes `value` into the first 8 bytes of `dst`.
///
/// # Panics
///
/// Panics if `dst` is shorter than 8 bytes.
#[inline]
pub fn encode_fixed64(dst: &mut [u8], value: u64) {
    LittleEndian::write_u64(dst, value);
}

/// Reads a little-endian `u32` from the front of `src`.
#[inline]
pub fn decode_fixed32(src: &[u8]) -> Result<u32, CodingError> {
    ensure_len(src, 4)?;
    Ok(LittleEndian::read_u32(src))
}

/// Reads a little-endian `u64` from the front of `src`.
#[inline]
pub fn decode_fixed64(src: &[u8]) -> Result<u64, CodingError> {
    ensure_len(src, 8)?;
    Ok(LittleEndian::read_u64(src))
}

pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    dst.extend_from_slice(&value.to_le_bytes());
}

pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    dst.extend_from_slice(&value.to_le_bytes());
}

fn ensure_len(src: &[u8], needed: usize) -> Result<(), CodingError> {
    if src.len() < needed {
        return Err(CodingError::Truncated {
            needed,
            available: src.len(),
        });
    }
    Ok(())
}

// -------------------- Varint --------------------

/// Number of bytes the varint encoding of `value` occupies.
///
/// Always equals what [`encode_varint64`] (or [`encode_varint32`] for
/// values that fit in 32 bits) writes.
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= u64::from(CONTINUATION) {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encodes `value` into the front of `dst`, returning the number of bytes
/// written.
///
/// # Panics
///
/// Panics if `dst` is shorter than `varint_length(value)`.
pub fn encode_varint32(dst: &mut [u8], value: u32) -> usize {
    encode_varint64(dst, u64::from(value))
}

/// Encodes `value` into the front of `dst`, returning the number of bytes
/// written.
///
/// # Panics
///
/// Panics if `dst` is shorter than `varint_length(value)`.
pub fn encode_varint64(dst: &mut [u8], mut value: u64) -> usize {
    let mut i = 0;
    while value >= u64::from(CONTINUATION) {
        dst[i] = (value as u8) | CONTINUATION;
        value >>= 7;
        i += 1;
    }
    dst[i] = value as u8;
    i + 1
}

pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; MAX_VARINT32_LEN];
    let n = encode_varint32(&mut buf, value);
    dst.extend_from_slice(&buf[..n]);
}

pub fn put_varint64(dst: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; MAX_VARINT64_LEN];
    let n = encode_varint64(&mut buf, value);
    dst.extend_from_slice(&buf[..n]);
}

/// Decodes a varint32 from the front of `src`, returning `(value, consumed)`.
///
/// A fifth byte that carries bits above bit 31 is rejected rather than
/// silently truncated.
pub fn decode_varint32(src: &[u8]) -> Result<(u32, usize), CodingError> {
    let (value, consumed) = decode_varint(src, MAX_VARINT32_LEN)?;
    let value = u32::try_from(value).map_err(|_| CodingError::VarintOverflow { bits: 32 })?;
    Ok((value, consumed))
}

/// Decodes a varint64 from the front of `src`, returning `(value, consumed)`.
pub fn decode_varint64(src: &[u8]) -> Result<(u64, usize), CodingError> {
    decode_varint(src, MAX_VARINT64_LEN)
}

fn decode_varint(src: &[u8], max_len: usize) -> Result<(u64, usize), CodingError> {
    let mut result = 0u64;
    for (i, &byte) in src.iter().take(max_len).enumerate() {
        let shift = 7 * i as u32;
        let group = u64::from(byte & !CONTINUATION);
        // The tenth byte of a varint64 may only contribute bit 63.
        if shift == 63 && group > 1 {
            return Err(CodingError::VarintOverflow { bits: 64 });
        }
        result |= group << shift;
        if byte & CONTINUATION == 0 {
            return Ok((result, i + 1));
        }
    }
    if src.len() >= max_len {
        let bits = if max_len == MAX_VARINT32_LEN { 32 } else { 64 };
        return Err(CodingError::VarintOverflow { bits });
    }
    Err(CodingError::Truncated {
        needed: src.len() + 1,
        available: src.len(),
    })
}

/// Decodes a varint32 from the front of `input` and advances it.
pub fn get_varint32(input: &mut &[u8]) -> Result<u32, CodingError> {
    let src = *input;
    let (value, consumed) = decode_varint32(src)?;
    *input = &src[consumed..];
    Ok(value)
}

/// Decodes a varint64 from the front of `input` and advances it.
pub fn get_varint64(input: &mut &[u8]) -> Result<u64, CodingError> {
    let src = *input;
    let (value, consumed) = decode_varint64(src)?;
    *input = &src[consumed..];
    Ok(value)
}

// -------------------- Length-prefixed slices --------------------

/// Appends `varint32(value.len())` followed by `value`.
///
/// # Panics
///
/// Panics if `value` is longer than `u32::MAX` bytes.
pub fn put_length_prefixed_slice(dst: &mut Vec<u8>, value: &[u8]) {
    let len = u32::try_from(value.len()).expect("length-prefixed slice exceeds u32::MAX bytes");
    put_varint32(dst, len);
    dst.extend_from_slice(value);
}

/// Decodes a length-prefixed slice from the front of `src`, returning the
/// slice and the total number of bytes consumed (prefix included).
pub fn decode_length_prefixed_slice(src: &[u8]) -> Result<(&[u8], usize), CodingError> {
    let (len, prefix) = decode_varint32(src)?;
    let len = len as usize;
    let rest = &src[prefix..];
    if rest.len() < len {
        return Err(CodingError::LengthOverrun {
            len,
            remaining: rest.len(),
        });
    }
    Ok((&rest[..len], prefix + len))
}

/// Decodes a length-prefixed slice from the front of `input` and advances it.
///
/// On failure `input` is left untouched.
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], CodingError> {
    let src: &'a [u8] = *input;
    let (slice, consumed) = decode_length_prefixed_slice(src)?;
    *input = &src[consumed..];
    Ok(slice)
}

#[cfg(test)]
mod tests;
