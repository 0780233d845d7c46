//! Outbound side of the signaling relay.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::OutgoingSignal;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel is closed")]
    Closed,
    #[error("failed to send {event}: {reason}")]
    Send { event: &'static str, reason: String },
}

/// Delivers call signals to the relay, which forwards them by recipient id.
///
/// Inbound signals are not part of this trait: the transport hands them to
/// [`super::CallManager::run`] through a channel.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, signal: OutgoingSignal) -> Result<(), SignalingError>;
}
