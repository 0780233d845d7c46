//! Local media for calls.
//!
//! - [`LocalTrack`], [`MediaHandle`]: captured tracks shared by reference with
//!   the peer connection
//! - [`MediaDevices`]: capture source, acquired once per call
//! - [`SyntheticDevices`]: capture source producing silence and blank frames

mod devices;
mod track;

pub use devices::{MediaDevices, MediaError, SyntheticDevices};
pub use track::{LocalTrack, MediaHandle, OPUS_SILENCE_FRAME};
