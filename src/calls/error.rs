//! Call-related error types.

use thiserror::Error;

use super::media::MediaError;
use super::peer::PeerError;
use super::signaling::SignalingError;
use crate::state::InvalidTransition;
use crate::types::{EndReason, UserId};

#[derive(Debug, Error)]
pub enum CallError {
    #[error("a call with {0} is already in progress")]
    AlreadyInCall(UserId),

    #[error("no incoming call to answer")]
    NoIncomingCall,

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("peer connection error: {0}")]
    Peer(#[from] PeerError),

    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// The session this operation belonged to was torn down while it was
    /// suspended.
    #[error("call session is no longer active")]
    SessionGone,
}

impl CallError {
    /// Why the session ends when this error aborts it.
    pub fn end_reason(&self) -> EndReason {
        match self {
            Self::Media(_) => EndReason::MediaUnavailable,
            _ => EndReason::NegotiationFailed,
        }
    }

    /// Text shown to the user when this error aborts a call.
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadyInCall(_) => "You are already in a call.".to_string(),
            Self::Media(MediaError::PermissionDenied(_)) => {
                "Camera or microphone access was denied.".to_string()
            }
            Self::Media(MediaError::DeviceUnavailable(kind)) => {
                format!("No {kind} device is available.")
            }
            Self::Signaling(_) => "Lost connection to the call server.".to_string(),
            _ => "The call could not be connected.".to_string(),
        }
    }
}
