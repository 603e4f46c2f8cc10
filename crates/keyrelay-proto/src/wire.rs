//! Length-prefixed framing for CBOR payloads.
//!
//! Layout on the wire: `[length: u32 BE] + [body: CBOR, length bytes]`.
//! The prefix is validated against [`MAX_FRAME_SIZE`] before any body
//! allocation, so a hostile length cannot force a large buffer.

use bytes::BufMut;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ProtocolError, Result};

/// Maximum frame body size. Handshake payloads are a few KB of ciphertext;
/// anything near this cap is a protocol violation, not a legitimate frame.
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Length prefix size in bytes.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Encode a payload as a length-prefixed frame into `dst`.
///
/// # Errors
///
/// - `Encode` if CBOR serialization fails
/// - `FrameTooLarge` if the encoded body exceeds [`MAX_FRAME_SIZE`]
pub fn encode_frame<T: Serialize>(payload: &T, dst: &mut impl BufMut) -> Result<()> {
    let mut body = Vec::new();
    ciborium::into_writer(payload, &mut body).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: body.len(), max: MAX_FRAME_SIZE });
    }

    dst.put_u32(body.len() as u32);
    dst.put_slice(&body);
    Ok(())
}

/// Validate a length prefix and return the body length to read.
///
/// # Errors
///
/// - `FrameTooLarge` if the prefix claims more than [`MAX_FRAME_SIZE`]
pub fn body_len(prefix: [u8; LEN_PREFIX_SIZE]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }
    Ok(len)
}

/// Decode a frame body back into a payload.
///
/// # Errors
///
/// - `Decode` if the body is not valid CBOR for `T`
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    ciborium::from_reader(body).map_err(|e| ProtocolError::Decode(e.to_string()))
}
