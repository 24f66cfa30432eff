//! Text codec for stream messages
//!
//! Structured bodies travel as JSON over UTF-8. The `/get` and `/delete`
//! requests carry a bare name instead.

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("message is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a record as a field-tagged JSON body.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Encode)
}

/// Decode a JSON body, ignoring surrounding whitespace.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let text = std::str::from_utf8(bytes)?;
    serde_json::from_str(text.trim()).map_err(CodecError::Decode)
}

/// Decode a bare text body with surrounding whitespace removed.
pub fn decode_text(bytes: &[u8]) -> Result<String, CodecError> {
    Ok(std::str::from_utf8(bytes)?.trim().to_string())
}
