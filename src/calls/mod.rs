//! 1:1 calls over WebRTC.
//!
//! Signals travel through a relay that forwards by user id; media flows
//! peer to peer.
//!
//! # Architecture
//!
//! - [`CallManager`]: owns the single call session and drives it from
//!   `Idle` through `Outgoing`/`Incoming` and `Connected` to `Ended`
//! - [`PeerConnectionManager`]: one peer connection per session, with the
//!   candidate queues in both directions and in-call renegotiation
//! - [`PeerConnection`]: seam to the WebRTC stack, implemented by
//!   [`WebRtcPeerFactory`] on top of webrtc-rs
//! - [`MediaDevices`]: local capture, acquired once per call
//! - [`SignalingChannel`]: outbound signals to the relay
//!
//! # Negotiation
//!
//! The caller acquires media, creates the connection and sends `callUser`
//! with its offer. The callee buffers the offer while ringing and, once the
//! user answers, replies with `acceptCall`. Candidates that arrive before
//! the remote description are queued and applied in arrival order right
//! after it; local candidates are held back until the offer or answer has
//! gone out.

mod error;
mod manager;
mod media;
mod peer;
mod signaling;
mod webrtc_peer;

pub use error::CallError;
pub use manager::{CallManager, CallManagerConfig};
pub use media::{LocalTrack, MediaDevices, MediaError, MediaHandle, SyntheticDevices};
pub use peer::{
    PeerConnection, PeerConnectionFactory, PeerConnectionManager, PeerError, PeerEvent,
    PeerEventSink, SessionPeerEvent,
};
pub use signaling::{SignalingChannel, SignalingError};
pub use webrtc_peer::WebRtcPeerFactory;
