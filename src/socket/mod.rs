//! WebSocket transport to the signaling relay.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

pub mod error;
pub mod ws_signaling;

pub use error::{Result, SocketError};
pub use ws_signaling::{WsSignalingChannel, connect, decode_frame, encode_frame};
