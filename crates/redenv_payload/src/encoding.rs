use crate::wire_format::WireFormatVersion;
use crate::{DecodeError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| DecodeError::Malformed(format!("invalid base64: {}", e)))
}

/// Accepts upper or lower case, with or without whitespace between bytes.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|e| DecodeError::Malformed(format!("invalid hex: {}", e)))
}

/// Decodes operator-supplied text that may be either hex or base64.
///
/// An even-length run of hex digits is also valid base64, so a reading
/// whose length matches a known wire format wins. Hex is tried first and
/// is kept when neither reading matches.
pub fn decode_text(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Malformed("empty payload".to_string()));
    }

    let known = |bytes: &Vec<u8>| WireFormatVersion::from_len(bytes.len()).is_some();

    let hex = decode_hex(trimmed).ok();
    if let Some(bytes) = hex.as_ref().filter(|b| known(b)) {
        return Ok(bytes.clone());
    }

    let base64 = decode_base64(trimmed).ok();
    match (hex, base64) {
        (_, Some(bytes)) if known(&bytes) => Ok(bytes),
        (Some(bytes), _) | (None, Some(bytes)) => Ok(bytes),
        (None, None) => Err(DecodeError::Malformed(format!(
            "'{}' is neither hex nor base64",
            trimmed
        ))),
    }
}
