//! Local tracks and the handle that owns them for one call.

use bytes::Bytes;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::types::TrackKind;

/// One 20 ms Opus frame of silence.
pub const OPUS_SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// A captured track.
///
/// `enabled` is the mute bit: a disabled audio track keeps sending silence and
/// a disabled video track sends nothing. Flipping it never touches
/// negotiation.
pub struct LocalTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    rtc: Arc<TrackLocalStaticSample>,
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id())
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl LocalTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let codec = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };

        Self {
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            rtc: Arc::new(TrackLocalStaticSample::new(
                codec,
                format!("{}-{}", stream_id, kind),
                stream_id.to_string(),
            )),
        }
    }

    pub fn id(&self) -> &str {
        self.rtc.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Releases the capture. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        let was_running = !self.stopped.swap(true, Ordering::SeqCst);
        if was_running {
            debug!("Stopped local {} track {}", self.kind, self.id());
        }
        was_running
    }

    /// The track handed to the peer connection.
    pub fn rtc(&self) -> Arc<TrackLocalStaticSample> {
        self.rtc.clone()
    }

    /// Writes one captured frame. Returns `false` when nothing was written.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<bool, webrtc::Error> {
        if self.is_stopped() {
            return Ok(false);
        }

        let data = match (self.kind, self.is_enabled()) {
            (_, true) => data,
            (TrackKind::Audio, false) => Bytes::from_static(&OPUS_SILENCE_FRAME),
            (TrackKind::Video, false) => return Ok(false),
        };

        self.rtc
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(true)
    }
}

/// Tracks captured for one call. Cloning shares the tracks.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    stream_id: String,
    tracks: Vec<Arc<LocalTrack>>,
}

impl MediaHandle {
    pub fn new(stream_id: impl Into<String>, tracks: Vec<Arc<LocalTrack>>) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    pub fn track(&self, kind: TrackKind) -> Option<&Arc<LocalTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// Stops every track. Safe to call more than once.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(|t| t.is_stopped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> MediaHandle {
        MediaHandle::new(
            "local-1",
            vec![
                Arc::new(LocalTrack::new(TrackKind::Audio, "local-1")),
                Arc::new(LocalTrack::new(TrackKind::Video, "local-1")),
            ],
        )
    }

    #[test]
    fn test_tracks_start_enabled() {
        let media = handle();
        assert!(media.tracks().iter().all(|t| t.is_enabled()));
        assert_eq!(media.track(TrackKind::Audio).unwrap().id(), "local-1-audio");
    }

    #[test]
    fn test_clones_share_track_state() {
        let media = handle();
        let shared = media.clone();
        shared.track(TrackKind::Video).unwrap().set_enabled(false);
        assert!(!media.track(TrackKind::Video).unwrap().is_enabled());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let media = handle();
        let audio = media.track(TrackKind::Audio).unwrap().clone();
        media.stop();
        assert!(media.is_stopped());
        assert!(!audio.stop());
        media.stop();
        assert!(media.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_track_writes_nothing() {
        let track = LocalTrack::new(TrackKind::Audio, "local-1");
        track.stop();
        let written = track
            .write_sample(Bytes::from_static(&OPUS_SILENCE_FRAME), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!written);
    }

    #[tokio::test]
    async fn test_disabled_video_writes_nothing() {
        let track = LocalTrack::new(TrackKind::Video, "local-1");
        track.set_enabled(false);
        let written = track
            .write_sample(Bytes::from_static(&[0u8; 10]), Duration::from_millis(33))
            .await
            .unwrap();
        assert!(!written);
    }
}
