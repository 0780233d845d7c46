use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user on the signaling relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which side of the call this client is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallRole {
    Caller,
    Callee,
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub const ALL: [TrackKind; 2] = [TrackKind::Audio, TrackKind::Video];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// Local user hung up.
    LocalHangup,
    /// Remote peer sent `endCall`.
    RemoteHangup,
    /// Remote peer answered the invite with `busy`.
    RemoteBusy,
    /// Camera or microphone could not be acquired.
    MediaUnavailable,
    /// The peer connection failed or negotiation could not complete.
    NegotiationFailed,
}

impl EndReason {
    /// Whether the remote peer should be told about this termination.
    pub const fn notifies_remote(&self) -> bool {
        matches!(
            self,
            Self::LocalHangup | Self::MediaUnavailable | Self::NegotiationFailed
        )
    }
}

/// Desired enabled state of the local tracks.
///
/// Independent of whether a capture device exists yet, and kept across
/// successive calls within one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalMediaTrackState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl Default for LocalMediaTrackState {
    /// Microphone on, camera off.
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: false,
        }
    }
}

impl LocalMediaTrackState {
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio_enabled,
            TrackKind::Video => self.video_enabled,
        }
    }

    pub fn set(&mut self, kind: TrackKind, enabled: bool) {
        match kind {
            TrackKind::Audio => self.audio_enabled = enabled,
            TrackKind::Video => self.video_enabled = enabled,
        }
    }

    /// Flip the flag for `kind` and return the new value.
    pub fn toggle(&mut self, kind: TrackKind) -> bool {
        let enabled = !self.is_enabled(kind);
        self.set(kind, enabled);
        enabled
    }
}
