use super::call::{EndReason, TrackKind, UserId};
use crate::state::CallState;

/// Notifications published to the call UI.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// An invite arrived while idle; the UI should ring.
    IncomingCall { from: UserId },
    /// An invite arrived while another call was in progress.
    MissedCall { from: UserId },
    /// The call state machine moved.
    StateChanged(CallState),
    /// Media connectivity changed (ICE `connected`/`completed` or not).
    MediaConnectivity { connected: bool },
    /// The remote peer started sending a track.
    RemoteTrack { kind: TrackKind },
    /// The remote peer switched its camera on or off.
    RemoteCameraToggled { enabled: bool },
    /// A user-facing error message.
    Alert { message: String },
    /// The session was torn down.
    CallEnded { reason: EndReason },
    /// Presence list from the relay.
    OnlineUsers(Vec<UserId>),
}
