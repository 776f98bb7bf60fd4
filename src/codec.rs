//! Hexadecimal text codec for the writeHexadecimal path.

use crate::session::{Result, SerialError};

/// Decode hexadecimal text into bytes. Two characters per byte,
/// case-insensitive, no separators. Odd-length or non-hex input fails.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    hex::decode(text)
        .map_err(|e| SerialError::Parameter(format!("invalid hexadecimal payload: {}", e)))
}

/// Encode bytes as lowercase hexadecimal text.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}
