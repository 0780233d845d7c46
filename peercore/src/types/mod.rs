pub mod call;
pub mod events;
pub mod signal;

pub use call::{CallRole, EndReason, LocalMediaTrackState, TrackKind, UserId};
pub use events::CallEvent;
pub use signal::{
    EnvelopePayload, IceCandidate, IncomingSignal, OutgoingSignal, SdpType, SessionDescription,
    SignalDecodeError, SignalEnvelope, SignalType,
};
