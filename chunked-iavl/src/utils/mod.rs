//! Utilities used in this crate which can also be generally useful downstream.

use alloc::{string::String, vec::Vec};
use core::fmt::Write;

use thiserror::Error;
pub use winter_utils::{
    ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable, SliceReader,
};

// HEX CONVERSIONS
// ================================================================================================

/// Renders an array of bytes as hex into a String.
pub fn bytes_to_hex_string<const N: usize>(data: [u8; N]) -> String {
    let mut s = String::with_capacity(N + 2);

    s.push_str("0x");
    for byte in data.iter() {
        write!(s, "{byte:02x}").expect("formatting hex failed");
    }

    s
}

/// Defines errors which can occur during parsing of hexadecimal strings.
#[derive(Debug, Error)]
pub enum HexParseError {
    #[error("expected hex data to have length {expected}, including the 0x prefix, found {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("hex encoded data must start with 0x prefix")]
    MissingPrefix,
    #[error("hex encoded data must contain only characters [0-9a-fA-F]")]
    InvalidChar,
}

/// Parses a hex string into an array of bytes of known size.
pub fn hex_to_bytes<const N: usize>(value: &str) -> Result<[u8; N], HexParseError> {
    let expected: usize = (N * 2) + 2;
    if value.len() != expected {
        return Err(HexParseError::InvalidLength { expected, actual: value.len() });
    }

    if !value.starts_with("0x") {
        return Err(HexParseError::MissingPrefix);
    }

    let mut data = value.bytes().skip(2).map(|v| match v {
        b'0'..=b'9' => Ok(v - b'0'),
        b'a'..=b'f' => Ok(v - b'a' + 10),
        b'A'..=b'F' => Ok(v - b'A' + 10),
        _ => Err(HexParseError::InvalidChar),
    });

    let mut decoded = [0u8; N];
    for byte in decoded.iter_mut() {
        // These `unwrap` calls are okay because the length was checked above
        let high: u8 = data.next().unwrap()?;
        let low: u8 = data.next().unwrap()?;
        *byte = (high << 4) + low;
    }

    Ok(decoded)
}

// FRAMED WIRE ENCODING
// ================================================================================================
//
// Integers cross the wire as a one-byte length followed by that many bytes of big-endian
// payload, with leading zero bytes stripped (zero encodes as a bare zero length). Byte
// slices are framed the same way: a framed length followed by the raw bytes. Booleans are a
// single byte, `0` or `1`.

/// Writes an unsigned integer in the framed wire encoding.
pub fn write_framed_uint<W: ByteWriter>(target: &mut W, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    let payload = &bytes[skip..];
    target.write_u8(payload.len() as u8);
    target.write_bytes(payload);
}

/// Reads an unsigned integer in the framed wire encoding.
pub fn read_framed_uint<R: ByteReader>(source: &mut R) -> Result<u64, DeserializationError> {
    let length = source.read_u8()? as usize;
    if length > 8 {
        return Err(DeserializationError::InvalidValue(format!(
            "integer frame of {length} bytes exceeds the 8 byte maximum"
        )));
    }
    let mut value = 0u64;
    for _ in 0..length {
        value = (value << 8) | source.read_u8()? as u64;
    }
    Ok(value)
}

/// Writes a length-prefixed byte slice.
pub fn write_framed_bytes<W: ByteWriter>(target: &mut W, bytes: &[u8]) {
    write_framed_uint(target, bytes.len() as u64);
    target.write_bytes(bytes);
}

/// Reads a length-prefixed byte slice.
pub fn read_framed_bytes<R: ByteReader>(source: &mut R) -> Result<Vec<u8>, DeserializationError> {
    let length = read_framed_uint(source)? as usize;
    source.read_vec(length)
}

/// Writes a boolean as a single byte.
pub fn write_framed_bool<W: ByteWriter>(target: &mut W, value: bool) {
    target.write_u8(value as u8);
}

/// Reads a boolean encoded as a single byte.
pub fn read_framed_bool<R: ByteReader>(source: &mut R) -> Result<bool, DeserializationError> {
    match source.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => {
            Err(DeserializationError::InvalidValue(format!("invalid boolean encoding {other}")))
        },
    }
}

// TESTS
// ================================================================================================
