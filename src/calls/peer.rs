//! Peer connection management for one call session.
//!
//! [`PeerConnection`] is the seam to the WebRTC stack. [`PeerConnectionManager`]
//! drives it through one offer/answer exchange, buffers candidates in both
//! directions until they can be applied or sent, and handles in-call
//! renegotiation.
//!
//! Connection callbacks never reach back into call state directly: they are
//! turned into [`PeerEvent`]s tagged with the session id and sent over a
//! channel to [`super::CallManager`].

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use super::media::{LocalTrack, MediaHandle};
use crate::candidates::CandidateQueue;
use crate::ice::IceConfig;
use crate::types::{CallRole, IceCandidate, SessionDescription, TrackKind};
use crate::watchdog::OutboundSample;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("remote description was already applied")]
    RemoteDescriptionAlreadySet,

    #[error("remote description has not been applied yet")]
    RemoteDescriptionMissing,

    #[error("unsupported session description type: {0}")]
    UnsupportedDescription(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("peer connection is closed")]
    Closed,
}

/// Operations the call logic needs from a WebRTC peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerError>;

    /// Adds a receive-only transceiver for a kind we do not send.
    async fn add_recv_only(&self, kind: TrackKind) -> Result<(), PeerError>;

    async fn create_offer(&self) -> Result<SessionDescription, PeerError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    /// RTP byte counters per kind.
    async fn media_stats(&self) -> Result<OutboundSample, PeerError>;

    async fn close(&self) -> Result<(), PeerError>;
}

/// Creates peer connections wired to an event sink.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        ice: &IceConfig,
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, PeerError>;
}

/// Something the connection reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A local candidate was gathered.
    CandidateDiscovered(IceCandidate),
    /// ICE connectivity changed. `connected` is true for `connected` and
    /// `completed`.
    IceStateChanged { connected: bool, state: String },
    /// The connection failed for good.
    ConnectionFailed(String),
    /// The remote peer started sending a track.
    RemoteTrack(TrackKind),
}

/// A [`PeerEvent`] tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPeerEvent {
    pub session: u64,
    pub event: PeerEvent,
}

/// Sender half handed to a peer connection's callbacks.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    session: u64,
    tx: mpsc::UnboundedSender<SessionPeerEvent>,
}

impl PeerEventSink {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<SessionPeerEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn emit(&self, event: PeerEvent) {
        if self
            .tx
            .send(SessionPeerEvent {
                session: self.session,
                event,
            })
            .is_err()
        {
            debug!("Dropping peer event for session {}: receiver gone", self.session);
        }
    }
}

#[derive(Debug, Default)]
struct Negotiation {
    remote_applied: bool,
    inbound: CandidateQueue,
    outbound: CandidateQueue,
    outbound_open: bool,
    closed: bool,
}

/// Owns the peer connection of one session and the local media attached to
/// it.
pub struct PeerConnectionManager {
    pc: Arc<dyn PeerConnection>,
    role: CallRole,
    media: MediaHandle,
    negotiation: Mutex<Negotiation>,
}

impl PeerConnectionManager {
    /// Creates the connection. Takes ownership of `media`; it is stopped if
    /// the connection cannot be created.
    pub async fn open(
        factory: &dyn PeerConnectionFactory,
        ice: &IceConfig,
        role: CallRole,
        media: MediaHandle,
        events: PeerEventSink,
    ) -> Result<Self, PeerError> {
        let session = events.session();
        let pc = match factory.create(ice, events).await {
            Ok(pc) => pc,
            Err(e) => {
                media.stop();
                return Err(e);
            }
        };
        debug!("Opened peer connection for session {} as {:?}", session, role);

        Ok(Self {
            pc,
            role,
            media,
            negotiation: Mutex::new(Negotiation::default()),
        })
    }

    pub fn role(&self) -> CallRole {
        self.role
    }

    pub fn media(&self) -> &MediaHandle {
        &self.media
    }

    /// Attaches local tracks and produces the offer, already set as local
    /// description.
    pub async fn create_as_caller(&self) -> Result<SessionDescription, PeerError> {
        self.attach_tracks().await?;
        let offer = self.pc.create_offer().await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    /// Attaches local tracks, applies the remote offer (draining buffered
    /// candidates) and produces the answer, already set as local description.
    pub async fn create_as_callee(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, PeerError> {
        self.attach_tracks().await?;
        self.apply_remote(offer).await?;
        let answer = self.pc.create_answer().await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    /// Completes the caller side of the initial negotiation.
    pub async fn apply_remote_answer(&self, answer: SessionDescription) -> Result<(), PeerError> {
        self.apply_remote(answer).await
    }

    /// Applies a remote candidate, or buffers it while no remote description
    /// is known. Failures are logged and otherwise ignored.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            debug!("Ignoring remote candidate on closed connection");
            return;
        }
        if !negotiation.remote_applied {
            negotiation.inbound.enqueue(candidate);
            debug!(
                "Buffered remote candidate ({} pending)",
                negotiation.inbound.len()
            );
            return;
        }
        if let Err(e) = self.pc.add_ice_candidate(candidate).await {
            warn!("Failed to add remote ICE candidate: {}", e);
        }
    }

    /// Takes over candidates that arrived before this connection existed.
    /// They are placed ahead of anything buffered here already.
    pub async fn adopt_pending(&self, mut pending: CandidateQueue) {
        if pending.is_empty() {
            return;
        }
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return;
        }
        pending.append(&mut negotiation.inbound);
        negotiation.inbound = pending;
    }

    /// Number of remote candidates waiting for the remote description.
    pub async fn pending_candidates(&self) -> usize {
        self.negotiation.lock().await.inbound.len()
    }

    /// Routes a locally gathered candidate. Returns it when it may be sent
    /// now; otherwise it is held until [`Self::open_outbound`].
    pub async fn local_candidate(&self, candidate: IceCandidate) -> Option<IceCandidate> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return None;
        }
        if negotiation.outbound_open {
            return Some(candidate);
        }
        negotiation.outbound.enqueue(candidate);
        None
    }

    /// Marks the offer or answer as sent and returns the local candidates
    /// held back until now, in gathering order.
    pub async fn open_outbound(&self) -> Vec<IceCandidate> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return Vec::new();
        }
        negotiation.outbound_open = true;
        negotiation.outbound.drain()
    }

    /// Creates a fresh offer on the established connection.
    pub async fn renegotiate(&self) -> Result<SessionDescription, PeerError> {
        self.ensure_negotiated().await?;
        let offer = self.pc.create_offer().await?;
        self.pc.set_local_description(offer.clone()).await?;
        info!("Created renegotiation offer");
        Ok(offer)
    }

    /// Answers a renegotiation offer from the remote peer.
    pub async fn accept_renegotiation(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, PeerError> {
        self.ensure_negotiated().await?;
        self.pc.set_remote_description(offer).await?;
        let answer = self.pc.create_answer().await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    /// Completes a renegotiation we started.
    pub async fn apply_renegotiation_answer(
        &self,
        answer: SessionDescription,
    ) -> Result<(), PeerError> {
        self.ensure_negotiated().await?;
        self.pc.set_remote_description(answer).await
    }

    /// Flips the enabled bit of the attached track. Returns `false` when no
    /// track of that kind was captured.
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        match self.media.track(kind) {
            Some(track) => {
                track.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub async fn media_stats(&self) -> Result<OutboundSample, PeerError> {
        if self.negotiation.lock().await.closed {
            return Err(PeerError::Closed);
        }
        self.pc.media_stats().await
    }

    pub async fn is_closed(&self) -> bool {
        self.negotiation.lock().await.closed
    }

    /// Stops local media and closes the connection. Idempotent.
    pub async fn close(&self) {
        {
            let mut negotiation = self.negotiation.lock().await;
            if negotiation.closed {
                return;
            }
            negotiation.closed = true;
            negotiation.inbound.clear();
            negotiation.outbound.clear();
        }

        self.media.stop();
        if let Err(e) = self.pc.close().await {
            warn!("Error closing peer connection: {}", e);
        }
        debug!("Peer connection closed");
    }

    async fn attach_tracks(&self) -> Result<(), PeerError> {
        for kind in TrackKind::ALL {
            match self.media.track(kind) {
                Some(track) => self.pc.add_track(track.clone()).await?,
                None => self.pc.add_recv_only(kind).await?,
            }
        }
        Ok(())
    }

    /// Applies the one remote description of the initial exchange and drains
    /// the candidates buffered before it.
    async fn apply_remote(&self, desc: SessionDescription) -> Result<(), PeerError> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return Err(PeerError::Closed);
        }
        if negotiation.remote_applied {
            return Err(PeerError::RemoteDescriptionAlreadySet);
        }

        self.pc.set_remote_description(desc).await?;
        negotiation.remote_applied = true;

        let pending = negotiation.inbound.drain();
        if !pending.is_empty() {
            debug!("Applying {} buffered remote candidates", pending.len());
        }
        for candidate in pending {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                warn!("Failed to add buffered ICE candidate: {}", e);
            }
        }
        Ok(())
    }

    async fn ensure_negotiated(&self) -> Result<(), PeerError> {
        let negotiation = self.negotiation.lock().await;
        if negotiation.closed {
            return Err(PeerError::Closed);
        }
        if !negotiation.remote_applied {
            return Err(PeerError::RemoteDescriptionMissing);
        }
        Ok(())
    }
}
