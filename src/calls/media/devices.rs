//! Media acquisition.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

use super::track::{LocalTrack, MediaHandle, OPUS_SILENCE_FRAME};
use crate::types::TrackKind;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("permission to capture {0} was denied")]
    PermissionDenied(TrackKind),
    #[error("no {0} capture device available")]
    DeviceUnavailable(TrackKind),
}

/// Capture source for local media.
///
/// Audio is always requested; video only when `want_video` is set. Either
/// track missing makes the whole acquisition fail.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, want_video: bool) -> Result<MediaHandle, MediaError>;
}

const AUDIO_FRAME: Duration = Duration::from_millis(20);
const VIDEO_FRAME: Duration = Duration::from_millis(33);
/// Smallest VP8 interframe header; decoders render it as a repeat of the
/// previous frame.
const BLANK_VP8_FRAME: [u8; 3] = [0x31, 0x00, 0x00];

/// Capture source without hardware: the microphone produces Opus silence and
/// the camera blank VP8 frames. Used by the demo client and on hosts without
/// devices.
#[derive(Debug)]
pub struct SyntheticDevices {
    camera_available: bool,
    next_stream: AtomicU64,
}

impl SyntheticDevices {
    pub fn new(camera_available: bool) -> Self {
        Self {
            camera_available,
            next_stream: AtomicU64::new(1),
        }
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn acquire(&self, want_video: bool) -> Result<MediaHandle, MediaError> {
        if want_video && !self.camera_available {
            return Err(MediaError::DeviceUnavailable(TrackKind::Video));
        }

        let stream_id = format!("local-{}", self.next_stream.fetch_add(1, Ordering::SeqCst));
        let mut tracks = vec![Arc::new(LocalTrack::new(TrackKind::Audio, &stream_id))];
        if want_video {
            tracks.push(Arc::new(LocalTrack::new(TrackKind::Video, &stream_id)));
        }

        for track in &tracks {
            tokio::spawn(pump(track.clone()));
        }
        info!(
            "Acquired synthetic media {} ({} tracks)",
            stream_id,
            tracks.len()
        );
        Ok(MediaHandle::new(stream_id, tracks))
    }
}

/// Feeds frames into `track` until it is stopped.
async fn pump(track: Arc<LocalTrack>) {
    let (frame, payload) = match track.kind() {
        TrackKind::Audio => (AUDIO_FRAME, Bytes::from_static(&OPUS_SILENCE_FRAME)),
        TrackKind::Video => (VIDEO_FRAME, Bytes::from_static(&BLANK_VP8_FRAME)),
    };

    let mut ticker = tokio::time::interval(frame);
    while !track.is_stopped() {
        ticker.tick().await;
        if let Err(e) = track.write_sample(payload.clone(), frame).await {
            debug!("Dropped {} frame on {}: {}", track.kind(), track.id(), e);
        }
    }
    debug!("Capture pump for {} finished", track.id());
}
