#![forbid(unsafe_code)]

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default maximum size of a client-sent text frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024; // 64 KiB

/// Maximum size of a server-sent text frame.
///
/// Server events wrap client input with ids, names and timestamps, and `userList` grows with
/// the roster, so they get tungstenite's own default frame ceiling rather than the client limit.
pub const MAX_SERVER_FRAME_SIZE: usize = 16 << 20; // 16 MiB

#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("json decode error: {0}")]
	Decode(#[source] serde_json::Error),

	#[error("json encode error: {0}")]
	Encode(#[source] serde_json::Error),
}

/// Encode an event into a JSON text frame.
pub fn encode_frame<M: Serialize>(msg: &M, max_frame_size: usize) -> Result<String, ProtocolError> {
	let text = serde_json::to_string(msg).map_err(ProtocolError::Encode)?;
	if text.len() > max_frame_size {
		return Err(ProtocolError::FrameTooLarge {
			len: text.len(),
			max: max_frame_size,
		});
	}
	Ok(text)
}

/// Encode a frame using `DEFAULT_MAX_FRAME_SIZE`.
pub fn encode_frame_default<M: Serialize>(msg: &M) -> Result<String, ProtocolError> {
	encode_frame(msg, DEFAULT_MAX_FRAME_SIZE)
}

/// Decode a single JSON text frame.
///
/// The size check runs before parsing so oversized input is never handed to serde.
pub fn decode_frame<M: DeserializeOwned>(src: &str, max_frame_size: usize) -> Result<M, ProtocolError> {
	if src.len() > max_frame_size {
		return Err(ProtocolError::FrameTooLarge {
			len: src.len(),
			max: max_frame_size,
		});
	}

	serde_json::from_str(src).map_err(ProtocolError::Decode)
}
