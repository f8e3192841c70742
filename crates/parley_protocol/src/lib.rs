#![forbid(unsafe_code)]

pub mod events;
pub mod framing;

pub use events::{ChatMessagePayload, ClientEvent, MessagePayload, PresencePayload, ServerEvent};
pub use framing::{
	DEFAULT_MAX_FRAME_SIZE, MAX_SERVER_FRAME_SIZE, ProtocolError, decode_frame, encode_frame, encode_frame_default,
};
