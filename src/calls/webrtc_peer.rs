//! webrtc-rs backend for [`PeerConnection`].

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::stats::StatsReportType;
use webrtc::track::track_local::TrackLocal;

use super::media::LocalTrack;
use super::peer::{PeerConnection, PeerConnectionFactory, PeerError, PeerEvent, PeerEventSink};
use crate::ice::IceConfig;
use crate::types::{IceCandidate, SdpType, SessionDescription, TrackKind};
use crate::watchdog::OutboundSample;

/// Builds webrtc-rs peer connections with the default codecs and
/// interceptors.
pub struct WebRtcPeerFactory {
    api: API,
}

impl WebRtcPeerFactory {
    pub fn new() -> Result<Self, PeerError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(SettingEngine::default())
            .build();

        Ok(Self { api })
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        ice: &IceConfig,
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let config = RTCConfiguration {
            ice_servers: ice
                .servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ice_transport_policy: if ice.relay_only {
                RTCIceTransportPolicy::Relay
            } else {
                RTCIceTransportPolicy::All
            },
            ..Default::default()
        };

        let pc = Arc::new(self.api.new_peer_connection(config).await?);
        register_callbacks(&pc, events);
        Ok(Arc::new(WebRtcPeer { pc }))
    }
}

fn register_callbacks(pc: &Arc<RTCPeerConnection>, events: PeerEventSink) {
    let sink = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = sink.clone();
        Box::pin(async move {
            // None marks the end of gathering.
            let Some(candidate) = candidate else {
                debug!("ICE gathering complete for session {}", sink.session());
                return;
            };
            match candidate.to_json() {
                Ok(init) => sink.emit(PeerEvent::CandidateDiscovered(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                })),
                Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
            }
        })
    }));

    let sink = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let sink = sink.clone();
        Box::pin(async move {
            info!("ICE connection state for session {}: {}", sink.session(), state);
            if state == RTCIceConnectionState::Failed {
                sink.emit(PeerEvent::ConnectionFailed(format!("ICE {}", state)));
                return;
            }
            sink.emit(PeerEvent::IceStateChanged {
                connected: matches!(
                    state,
                    RTCIceConnectionState::Connected | RTCIceConnectionState::Completed
                ),
                state: state.to_string(),
            });
        })
    }));

    let sink = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let sink = sink.clone();
        Box::pin(async move {
            debug!("Peer connection state for session {}: {}", sink.session(), state);
            if state == RTCPeerConnectionState::Failed {
                sink.emit(PeerEvent::ConnectionFailed(format!("connection {}", state)));
            }
        })
    }));

    let sink = events;
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let sink = sink.clone();
        Box::pin(async move {
            let kind = match track.kind() {
                RTPCodecType::Audio => TrackKind::Audio,
                RTPCodecType::Video => TrackKind::Video,
                other => {
                    debug!("Ignoring remote track of kind {:?}", other);
                    return;
                }
            };
            info!("Remote {} track {} started", kind, track.id());
            sink.emit(PeerEvent::RemoteTrack(kind));

            // Playback is outside this crate; keep reading so the receive
            // buffers never fill up.
            tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });
        })
    }));
}

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

fn codec_type(kind: TrackKind) -> RTPCodecType {
    match kind {
        TrackKind::Audio => RTPCodecType::Audio,
        TrackKind::Video => RTPCodecType::Video,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, PeerError> {
    Ok(match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp)?,
        SdpType::Rollback => {
            return Err(PeerError::UnsupportedDescription("rollback".to_string()));
        }
    })
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, PeerError> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => return Err(PeerError::UnsupportedDescription(format!("{:?}", other))),
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerError> {
        let rtc: Arc<dyn TrackLocal + Send + Sync> = track.rtc();
        let sender = self.pc.add_track(rtc).await?;

        // RTCP has to be read for the interceptors (NACK, reports) to run.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn add_recv_only(&self, kind: TrackKind) -> Result<(), PeerError> {
        self.pc
            .add_transceiver_from_kind(
                codec_type(kind),
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        from_rtc(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        from_rtc(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn media_stats(&self) -> Result<OutboundSample, PeerError> {
        let report = self.pc.get_stats().await;
        let mut sample = OutboundSample::default();
        for stat in report.reports.values() {
            match stat {
                StatsReportType::OutboundRTP(rtp) => match &*rtp.kind {
                    "audio" => sample.audio_bytes_out += rtp.bytes_sent,
                    "video" => sample.video_bytes_out += rtp.bytes_sent,
                    _ => {}
                },
                StatsReportType::InboundRTP(rtp) => match &*rtp.kind {
                    "audio" => sample.audio_bytes_in += rtp.bytes_received,
                    "video" => sample.video_bytes_in += rtp.bytes_received,
                    _ => {}
                },
                _ => {}
            }
        }
        Ok(sample)
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.pc.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_conversion_keeps_type_and_sdp() {
        const SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
        let rtc = to_rtc(SessionDescription::answer(SDP)).unwrap();
        assert_eq!(rtc.sdp_type, RTCSdpType::Answer);

        let back = from_rtc(rtc).unwrap();
        assert_eq!(back, SessionDescription::answer(SDP));
    }

    #[test]
    fn test_rollback_is_not_sent_to_the_stack() {
        let desc = SessionDescription {
            sdp_type: SdpType::Rollback,
            sdp: String::new(),
        };
        assert!(matches!(
            to_rtc(desc),
            Err(PeerError::UnsupportedDescription(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_builds_relay_only_connection() {
        let factory = WebRtcPeerFactory::new().unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let ice = IceConfig {
            relay_only: true,
            ..Default::default()
        };

        let pc = factory
            .create(&ice, PeerEventSink::new(7, tx))
            .await
            .unwrap();
        pc.add_recv_only(TrackKind::Audio).await.unwrap();
        let offer = pc.create_offer().await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert!(offer.sdp.contains("m=audio"));
        pc.close().await.unwrap();
    }
}
