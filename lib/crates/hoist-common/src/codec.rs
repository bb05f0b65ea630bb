//! Text-safe manifest encoding.
//!
//! Manifests travel as `base64(zlib(json))`: JSON for the schema, zlib at
//! maximum compression to keep bus payloads small, and standard base64 so
//! the result is plain ASCII.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::manifest::Credential;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to compress payload: {0}")]
    Deflate(#[from] std::io::Error),

    #[error("corrupt compressed payload: {0}")]
    Inflate(#[from] flate2::DecompressError),

    #[error("compressed payload is truncated")]
    Truncated,

    #[error("payload does not match the manifest schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Encodes a manifest value to its transport text form.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the value cannot be serialised.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(json.len() / 2), Compression::best());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Decodes transport text back into a manifest value.
///
/// Surrounding whitespace is ignored so that files ending in a newline
/// decode cleanly.
///
/// # Errors
///
/// Fails on malformed base64, a corrupt or truncated zlib stream, or JSON
/// that does not fit `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    let compressed = STANDARD.decode(text.trim())?;
    let json = inflate(&compressed)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Decodes a manifest received as raw bytes from a bus or HTTP body.
///
/// Plain JSON (leading `{`) is accepted as-is; anything else goes through
/// [`decode`].
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let text = std::str::from_utf8(bytes)?.trim();
    if text.starts_with('{') {
        return Ok(serde_json::from_str(text)?);
    }
    decode(text)
}

/// Encodes a registry/broker credential as `base64(json)`.
pub fn encode_credential(credential: &Credential) -> Result<String, CodecError> {
    Ok(STANDARD.encode(serde_json::to_vec(credential)?))
}

/// Decodes a credential produced by [`encode_credential`].
pub fn decode_credential(text: &str) -> Result<Credential, CodecError> {
    let json = STANDARD.decode(text.trim())?;
    Ok(serde_json::from_slice(&json)?)
}

/// Inflates a complete zlib stream, rejecting streams that end early.
fn inflate(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(256));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let consumed = usize::try_from(before_in).map_err(|_| CodecError::Truncated)?;
        let input = data.get(consumed..).unwrap_or_default();
        match inflater.decompress_vec(input, &mut out, FlushDecompress::Finish)? {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                if inflater.total_in() == before_in && inflater.total_out() == before_out {
                    return Err(CodecError::Truncated);
                }
            }
        }
    }
}
