use thiserror::Error;

use crate::types::SignalDecodeError;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Socket is closed")]
    SocketClosed,
    #[error("Invalid signaling request: {0}")]
    InvalidRequest(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("Undecodable signal: {0}")]
    Decode(#[from] SignalDecodeError),
}

pub type Result<T> = std::result::Result<T, SocketError>;
