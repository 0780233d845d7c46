//! Call manager for orchestrating call lifecycle.

use super::error::CallError;
use super::media::{MediaDevices, MediaHandle};
use super::peer::{
    PeerConnectionFactory, PeerConnectionManager, PeerError, PeerEvent, PeerEventSink,
    SessionPeerEvent,
};
use super::signaling::{SignalingChannel, SignalingError};
use crate::candidates::CandidateQueue;
use crate::ice_config::IceConfigService;
use crate::state::{CallSession, CallState, CallTransition};
use crate::types::events::{CHANNEL_CAPACITY, CallEvent, EventBus};
use crate::types::{
    CallRole, EndReason, IceCandidate, IncomingSignal, LocalMediaTrackState, OutgoingSignal,
    SessionDescription, TrackKind, UserId,
};
use crate::watchdog::{OutboundMediaWatchdog, WatchdogAction, WatchdogConfig};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;

/// Configuration for the call manager.
#[derive(Debug, Clone)]
pub struct CallManagerConfig {
    /// Request a camera track when acquiring media.
    pub capture_video: bool,
    /// Outbound media watchdog. `None` disables periodic sampling;
    /// [`CallManager::check_outbound_media`] still works.
    pub watchdog: Option<WatchdogConfig>,
    /// Capacity of the UI event channel.
    pub event_capacity: usize,
}

impl Default for CallManagerConfig {
    fn default() -> Self {
        Self {
            capture_video: false,
            watchdog: Some(WatchdogConfig::default()),
            event_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// The one call in progress.
struct ActiveCall {
    /// Session id; completions carrying another id are stale.
    id: u64,
    session: CallSession,
    /// Offer of an incoming call, kept until the user answers.
    remote_offer: Option<SessionDescription>,
    /// Remote candidates that arrived before the peer connection existed.
    early_candidates: CandidateQueue,
    peer: Option<Arc<PeerConnectionManager>>,
    media_connected: bool,
    monitor: OutboundMediaWatchdog,
    sampler: Option<JoinHandle<()>>,
}

impl ActiveCall {
    /// Whether the remote peer has heard of this session.
    fn remote_aware(&self) -> bool {
        match self.session.state {
            CallState::Outgoing { offer_sent } => offer_sent,
            _ => true,
        }
    }
}

enum InviteOutcome {
    Ringing(u64),
    Replaced,
    Duplicate,
    Busy(UserId),
}

/// Manages the single call session and its state transitions.
pub struct CallManager {
    local_user: UserId,
    config: CallManagerConfig,
    signaling: Arc<dyn SignalingChannel>,
    devices: Arc<dyn MediaDevices>,
    peers: Arc<dyn PeerConnectionFactory>,
    ice: Arc<IceConfigService>,
    active: Mutex<Option<ActiveCall>>,
    /// Desired mute/camera state, kept across calls.
    track_state: Mutex<LocalMediaTrackState>,
    online_users: RwLock<Vec<UserId>>,
    next_session: AtomicU64,
    events: EventBus,
    peer_tx: mpsc::UnboundedSender<SessionPeerEvent>,
}

impl CallManager {
    /// Create a new call manager. The returned receiver carries the events of
    /// every peer connection this manager creates; feed it to
    /// [`CallManager::run`] or [`CallManager::handle_peer_event`].
    pub fn new(
        local_user: UserId,
        config: CallManagerConfig,
        signaling: Arc<dyn SignalingChannel>,
        devices: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerConnectionFactory>,
        ice: Arc<IceConfigService>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionPeerEvent>) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);
        let manager = Arc::new(Self {
            local_user,
            config,
            signaling,
            devices,
            peers,
            ice,
            active: Mutex::new(None),
            track_state: Mutex::new(LocalMediaTrackState::default()),
            online_users: RwLock::new(Vec::new()),
            next_session: AtomicU64::new(1),
            events,
            peer_tx,
        });
        (manager, peer_rx)
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> CallState {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|call| call.session.state.clone())
            .unwrap_or_default()
    }

    pub async fn session(&self) -> Option<CallSession> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|call| call.session.clone())
    }

    /// ICE-level media connectivity of the current call.
    pub async fn is_media_connected(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|call| call.media_connected)
    }

    pub async fn track_state(&self) -> LocalMediaTrackState {
        *self.track_state.lock().await
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.online_users.read().await.clone()
    }

    /// Start an outgoing call. Rejected without side effects unless idle.
    pub async fn call(&self, remote: UserId) -> Result<(), CallError> {
        let id = {
            let mut active = self.active.lock().await;
            if let Some(current) = active.as_ref() {
                return Err(CallError::AlreadyInCall(
                    current.session.remote_user_id.clone(),
                ));
            }
            let id = self.next_session.fetch_add(1, Ordering::SeqCst);
            let call = self.new_active(
                id,
                CallSession::new_outgoing(self.local_user.clone(), remote.clone()),
            );
            self.events
                .publish(CallEvent::StateChanged(call.session.state.clone()));
            *active = Some(call);
            id
        };

        info!("Calling {} (session {})", remote, id);
        let result = self.place_call(id, remote).await;
        self.finish(id, result).await
    }

    /// Answer the ringing incoming call.
    pub async fn answer(self: &Arc<Self>) -> Result<(), CallError> {
        let (id, remote, offer) = {
            let mut active = self.active.lock().await;
            let call = match active.as_mut() {
                Some(call) if call.session.state.can_answer() => call,
                _ => return Err(CallError::NoIncomingCall),
            };
            let offer = call
                .remote_offer
                .clone()
                .ok_or(CallError::NoIncomingCall)?;
            call.session
                .apply_transition(CallTransition::AnswerStarted)?;
            self.events
                .publish(CallEvent::StateChanged(call.session.state.clone()));
            (call.id, call.session.remote_user_id.clone(), offer)
        };

        info!("Answering call from {} (session {})", remote, id);
        let result = self.accept_call(id, remote, offer).await;
        self.finish(id, result).await
    }

    /// Hang up. Safe to call in any state and more than once.
    pub async fn leave(&self) {
        if !self.teardown(None, EndReason::LocalHangup).await {
            debug!("leave() without an active call");
        }
    }

    /// Flip the desired state of a local track and apply it to the current
    /// call. Returns the new enabled state.
    pub async fn toggle_track(&self, kind: TrackKind) -> bool {
        let enabled = self.track_state.lock().await.toggle(kind);
        self.apply_track_state(kind, enabled).await;
        enabled
    }

    pub async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) {
        self.track_state.lock().await.set(kind, enabled);
        self.apply_track_state(kind, enabled).await;
    }

    /// Dispatch one signal from the relay.
    pub async fn handle_signal(self: &Arc<Self>, signal: IncomingSignal) {
        debug!("<-- {}", signal.event());
        match signal {
            IncomingSignal::Hey { from, signal } => self.on_invite(from, signal).await,
            IncomingSignal::CallAccepted(answer) => self.on_call_accepted(answer).await,
            IncomingSignal::IceCandidate(candidate) => self.on_remote_candidate(candidate).await,
            IncomingSignal::Renegotiate { offer } => self.on_renegotiate(offer).await,
            IncomingSignal::RenegotiateAnswer { answer } => {
                self.on_renegotiate_answer(answer).await
            }
            IncomingSignal::CallEnded => {
                if !self.teardown(None, EndReason::RemoteHangup).await {
                    debug!("callEnded without an active call");
                }
            }
            IncomingSignal::CameraToggled { enabled } => {
                if self.current_id().await.is_some() {
                    self.events
                        .publish(CallEvent::RemoteCameraToggled { enabled });
                }
            }
            IncomingSignal::Busy { from } => self.on_busy(from).await,
            IncomingSignal::UpdateOnlineUsers(users) => {
                debug!("{} users online", users.len());
                *self.online_users.write().await = users.clone();
                self.events.publish(CallEvent::OnlineUsers(users));
            }
        }
    }

    /// Dispatch one event reported by a peer connection.
    pub async fn handle_peer_event(&self, event: SessionPeerEvent) {
        let SessionPeerEvent { session, event } = event;
        match event {
            PeerEvent::CandidateDiscovered(candidate) => {
                let Some((peer, remote)) = self.peer_for(session).await else {
                    debug!("Dropping local candidate of stale session {}", session);
                    return;
                };
                if let Some(candidate) = peer.local_candidate(candidate).await {
                    self.send_best_effort(OutgoingSignal::IceCandidate {
                        to: remote,
                        candidate,
                    })
                    .await;
                }
            }
            PeerEvent::IceStateChanged { connected, state } => {
                let changed = {
                    let mut active = self.active.lock().await;
                    match active.as_mut() {
                        Some(call) if call.id == session => {
                            let changed = call.media_connected != connected;
                            call.media_connected = connected;
                            changed
                        }
                        _ => false,
                    }
                };
                debug!("ICE state {} for session {}", state, session);
                if changed {
                    info!(
                        "Media {} for session {}",
                        if connected { "connected" } else { "disconnected" },
                        session
                    );
                    self.events
                        .publish(CallEvent::MediaConnectivity { connected });
                }
            }
            PeerEvent::ConnectionFailed(reason) => {
                self.abort(session, &CallError::Peer(PeerError::ConnectionFailed(reason)))
                    .await;
            }
            PeerEvent::RemoteTrack(kind) => {
                if self.is_current(session).await {
                    self.events.publish(CallEvent::RemoteTrack { kind });
                }
            }
        }
    }

    /// Take one outbound media sample for the current call and renegotiate
    /// if the watchdog asks for it.
    pub async fn check_outbound_media(&self) -> WatchdogAction {
        match self.current_id().await {
            Some(id) => self.sample_outbound_media(id).await,
            None => WatchdogAction::Stop,
        }
    }

    /// Process relay signals and peer events until the signaling channel
    /// closes, then hang up.
    pub async fn run(
        self: Arc<Self>,
        mut signals: mpsc::Receiver<IncomingSignal>,
        mut peer_events: mpsc::UnboundedReceiver<SessionPeerEvent>,
    ) {
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => {
                        warn!("Signaling channel closed");
                        break;
                    }
                },
                Some(event) = peer_events.recv() => self.handle_peer_event(event).await,
            }
        }
        self.leave().await;
    }

    fn new_active(&self, id: u64, session: CallSession) -> ActiveCall {
        ActiveCall {
            id,
            session,
            remote_offer: None,
            early_candidates: CandidateQueue::new(),
            peer: None,
            media_connected: false,
            monitor: OutboundMediaWatchdog::new(self.config.watchdog.clone().unwrap_or_default()),
            sampler: None,
        }
    }

    async fn place_call(&self, id: u64, remote: UserId) -> Result<(), CallError> {
        let media = self.devices.acquire(self.config.capture_video).await?;
        let peer = self.connect_peer(id, CallRole::Caller, media).await?;
        let offer = peer.create_as_caller().await?;

        self.transition(id, CallTransition::OfferSent).await?;
        self.send(OutgoingSignal::CallUser {
            user_to_call: remote.clone(),
            signal_data: offer,
            from: self.local_user.clone(),
        })
        .await?;
        self.flush_local_candidates(&peer, &remote).await;
        Ok(())
    }

    async fn accept_call(
        self: &Arc<Self>,
        id: u64,
        remote: UserId,
        offer: SessionDescription,
    ) -> Result<(), CallError> {
        let media = self.devices.acquire(self.config.capture_video).await?;
        let peer = self.connect_peer(id, CallRole::Callee, media).await?;
        let answer = peer.create_as_callee(offer).await?;
        if !self.is_current(id).await {
            return Err(CallError::SessionGone);
        }

        self.send(OutgoingSignal::AcceptCall {
            signal: answer,
            to: remote.clone(),
        })
        .await?;
        self.transition(id, CallTransition::AnswerSent).await?;
        self.start_sampler(id).await;
        self.flush_local_candidates(&peer, &remote).await;
        Ok(())
    }

    /// Creates the peer connection for session `id` and installs it, handing
    /// over early candidates and the desired track state.
    async fn connect_peer(
        &self,
        id: u64,
        role: CallRole,
        media: MediaHandle,
    ) -> Result<Arc<PeerConnectionManager>, CallError> {
        if !self.is_current(id).await {
            media.stop();
            return Err(CallError::SessionGone);
        }

        let ice = self.ice.get().await;
        let sink = PeerEventSink::new(id, self.peer_tx.clone());
        let peer = Arc::new(
            PeerConnectionManager::open(self.peers.as_ref(), &ice, role, media, sink).await?,
        );

        let installed = {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(call) if call.id == id => {
                    let desired = *self.track_state.lock().await;
                    for kind in TrackKind::ALL {
                        peer.set_track_enabled(kind, desired.is_enabled(kind));
                    }
                    peer.adopt_pending(std::mem::take(&mut call.early_candidates))
                        .await;
                    call.peer = Some(peer.clone());
                    true
                }
                _ => false,
            }
        };

        if !installed {
            peer.close().await;
            return Err(CallError::SessionGone);
        }
        Ok(peer)
    }

    async fn finish(&self, id: u64, result: Result<(), CallError>) -> Result<(), CallError> {
        match result {
            Ok(()) => Ok(()),
            Err(CallError::SessionGone) => {
                debug!("Session {} ended while an operation was suspended", id);
                Ok(())
            }
            Err(e) if !self.is_current(id).await => {
                debug!("Session {} ended before its operation failed: {}", id, e);
                Ok(())
            }
            Err(e) => {
                self.abort(id, &e).await;
                Err(e)
            }
        }
    }

    /// Fatal error path: alert the user and tear the session down.
    async fn abort(&self, id: u64, err: &CallError) {
        if !self.is_current(id).await {
            debug!("Ignoring failure of stale session {}: {}", id, err);
            return;
        }
        error!("Call session {} failed: {}", id, err);
        self.events.publish(CallEvent::Alert {
            message: err.user_message(),
        });
        self.teardown(Some(id), err.end_reason()).await;
    }

    /// Ends the active session if it matches `expected` (any session when
    /// `None`). Returns whether a session was ended.
    async fn teardown(&self, expected: Option<u64>, reason: EndReason) -> bool {
        let taken = {
            let mut active = self.active.lock().await;
            let matches = active
                .as_ref()
                .is_some_and(|call| expected.is_none_or(|id| id == call.id));
            if matches { active.take() } else { None }
        };
        let Some(mut call) = taken else {
            return false;
        };

        if let Some(sampler) = call.sampler.take() {
            sampler.abort();
        }
        call.early_candidates.clear();
        let notify = reason.notifies_remote() && call.remote_aware();
        let remote = call.session.remote_user_id.clone();

        if let Err(e) = call
            .session
            .apply_transition(CallTransition::Terminated { reason })
        {
            warn!("Session {}: {}", call.id, e);
        }
        info!(
            "Call session {} with {} ended: {:?}",
            call.id, remote, reason
        );
        self.events
            .publish(CallEvent::StateChanged(call.session.state.clone()));

        if let Some(peer) = call.peer.take() {
            peer.close().await;
        }
        if notify {
            self.send_best_effort(OutgoingSignal::EndCall { to: remote })
                .await;
        }

        self.events.publish(CallEvent::CallEnded { reason });
        self.events.publish(CallEvent::StateChanged(CallState::Idle));
        true
    }

    async fn on_invite(&self, from: UserId, offer: SessionDescription) {
        let outcome = {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                None => {
                    let id = self.next_session.fetch_add(1, Ordering::SeqCst);
                    let mut call = self.new_active(
                        id,
                        CallSession::new_incoming(self.local_user.clone(), from.clone()),
                    );
                    call.remote_offer = Some(offer);
                    self.events
                        .publish(CallEvent::StateChanged(call.session.state.clone()));
                    *active = Some(call);
                    InviteOutcome::Ringing(id)
                }
                Some(call)
                    if call.session.remote_user_id == from && call.session.state.can_answer() =>
                {
                    call.remote_offer = Some(offer);
                    call.early_candidates.clear();
                    InviteOutcome::Replaced
                }
                Some(call)
                    if call.session.remote_user_id == from
                        && matches!(call.session.state, CallState::Incoming { answering: true }) =>
                {
                    InviteOutcome::Duplicate
                }
                Some(call) => InviteOutcome::Busy(call.session.remote_user_id.clone()),
            }
        };

        match outcome {
            InviteOutcome::Ringing(id) => {
                info!("Incoming call from {} (session {})", from, id);
                self.events.publish(CallEvent::IncomingCall { from });
            }
            InviteOutcome::Replaced => {
                debug!("Repeated invite from {}, replaced buffered offer", from);
            }
            InviteOutcome::Duplicate => {
                debug!("Ignoring repeated invite from {} while answering", from);
            }
            InviteOutcome::Busy(current) => {
                info!(
                    "Missed call from {} while in a call with {}",
                    from, current
                );
                self.events
                    .publish(CallEvent::MissedCall { from: from.clone() });
                self.send_best_effort(OutgoingSignal::Busy { to: from }).await;
            }
        }
    }

    async fn on_call_accepted(self: &Arc<Self>, answer: SessionDescription) {
        let (id, peer) = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(call) if call.session.state.can_accept_answer() => match &call.peer {
                    Some(peer) => (call.id, peer.clone()),
                    None => {
                        debug!("callAccepted before the peer connection exists");
                        return;
                    }
                },
                _ => {
                    debug!("Ignoring callAccepted without a ringing outgoing call");
                    return;
                }
            }
        };

        match peer.apply_remote_answer(answer).await {
            Ok(()) => {}
            Err(e @ (PeerError::RemoteDescriptionAlreadySet | PeerError::Closed)) => {
                warn!("Ignoring answer for session {}: {}", id, e);
                return;
            }
            Err(e) => {
                self.abort(id, &CallError::Peer(e)).await;
                return;
            }
        }

        match self.transition(id, CallTransition::RemoteAccepted).await {
            Ok(()) => self.start_sampler(id).await,
            Err(e) => debug!("Discarding answer completion: {}", e),
        }
    }

    async fn on_remote_candidate(&self, candidate: IceCandidate) {
        let peer = {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                None => {
                    debug!("Dropping remote candidate: no active call");
                    return;
                }
                Some(call) => match &call.peer {
                    Some(peer) => peer.clone(),
                    None => {
                        call.early_candidates.enqueue(candidate);
                        return;
                    }
                },
            }
        };
        peer.add_remote_candidate(candidate).await;
    }

    async fn on_renegotiate(&self, offer: SessionDescription) {
        let Some((_, peer, remote)) = self.current_peer().await else {
            debug!("Ignoring renegotiation offer without a connection");
            return;
        };
        match peer.accept_renegotiation(offer).await {
            Ok(answer) => {
                info!("Answering renegotiation from {}", remote);
                self.send_best_effort(OutgoingSignal::RenegotiateAnswer { to: remote, answer })
                    .await;
            }
            Err(e) => warn!("Renegotiation offer from {} failed: {}", remote, e),
        }
    }

    async fn on_renegotiate_answer(&self, answer: SessionDescription) {
        let Some((id, peer, _)) = self.current_peer().await else {
            debug!("Ignoring renegotiation answer without a connection");
            return;
        };
        match peer.apply_renegotiation_answer(answer).await {
            Ok(()) => info!("Renegotiation of session {} complete", id),
            Err(e) => warn!("Renegotiation answer for session {} failed: {}", id, e),
        }
    }

    async fn on_busy(&self, from: Option<UserId>) {
        let (id, remote) = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(call)
                    if matches!(call.session.state, CallState::Outgoing { .. })
                        && from
                            .as_ref()
                            .is_none_or(|from| *from == call.session.remote_user_id) =>
                {
                    (call.id, call.session.remote_user_id.clone())
                }
                _ => {
                    debug!("Ignoring busy signal");
                    return;
                }
            }
        };

        info!("{} is busy", remote);
        self.events.publish(CallEvent::Alert {
            message: format!("{} is in another call.", remote),
        });
        self.teardown(Some(id), EndReason::RemoteBusy).await;
    }

    async fn apply_track_state(&self, kind: TrackKind, enabled: bool) {
        info!(
            "Local {} {}",
            kind,
            if enabled { "enabled" } else { "disabled" }
        );
        let Some((_, peer, remote)) = self.current_peer().await else {
            return;
        };
        let attached = peer.set_track_enabled(kind, enabled);
        if kind == TrackKind::Video && attached {
            self.send_best_effort(OutgoingSignal::CameraToggled {
                to: remote,
                enabled,
            })
            .await;
        }
    }

    async fn start_sampler(self: &Arc<Self>, id: u64) {
        let Some(config) = self.config.watchdog.as_ref() else {
            return;
        };
        let handle = tokio::spawn(sample_loop(Arc::downgrade(self), id, config.interval));

        let mut active = self.active.lock().await;
        match active.as_mut() {
            Some(call) if call.id == id => {
                if let Some(previous) = call.sampler.replace(handle) {
                    previous.abort();
                }
            }
            _ => handle.abort(),
        }
    }

    async fn sample_outbound_media(&self, id: u64) -> WatchdogAction {
        let Some((peer, _)) = self.peer_for(id).await else {
            return WatchdogAction::Stop;
        };
        let sample = match peer.media_stats().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Failed to read media stats for session {}: {}", id, e);
                return WatchdogAction::Continue;
            }
        };

        let action = {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(call) if call.id == id => {
                    debug!(
                        "Session {} stats #{}: audio out={} in={}, video out={} in={}",
                        id,
                        call.monitor.samples() + 1,
                        sample.audio_bytes_out,
                        sample.audio_bytes_in,
                        sample.video_bytes_out,
                        sample.video_bytes_in
                    );
                    call.monitor.observe(&sample, call.media_connected)
                }
                _ => WatchdogAction::Stop,
            }
        };

        if action == WatchdogAction::Renegotiate {
            warn!("No outbound media on session {}, renegotiating", id);
            self.renegotiate(id).await;
        }
        action
    }

    async fn renegotiate(&self, id: u64) {
        let Some((peer, remote)) = self.peer_for(id).await else {
            return;
        };
        match peer.renegotiate().await {
            Ok(offer) => {
                if self.is_current(id).await {
                    self.send_best_effort(OutgoingSignal::Renegotiate { to: remote, offer })
                        .await;
                }
            }
            Err(e) => warn!("Renegotiation of session {} failed: {}", id, e),
        }
    }

    async fn flush_local_candidates(&self, peer: &PeerConnectionManager, remote: &UserId) {
        for candidate in peer.open_outbound().await {
            self.send_best_effort(OutgoingSignal::IceCandidate {
                to: remote.clone(),
                candidate,
            })
            .await;
        }
    }

    async fn transition(&self, id: u64, transition: CallTransition) -> Result<(), CallError> {
        let mut active = self.active.lock().await;
        let call = match active.as_mut() {
            Some(call) if call.id == id => call,
            _ => return Err(CallError::SessionGone),
        };
        call.session.apply_transition(transition)?;
        info!("Session {} is now {:?}", id, call.session.state);
        self.events
            .publish(CallEvent::StateChanged(call.session.state.clone()));
        Ok(())
    }

    async fn current_id(&self) -> Option<u64> {
        self.active.lock().await.as_ref().map(|call| call.id)
    }

    async fn is_current(&self, id: u64) -> bool {
        self.current_id().await == Some(id)
    }

    async fn current_peer(&self) -> Option<(u64, Arc<PeerConnectionManager>, UserId)> {
        let active = self.active.lock().await;
        let call = active.as_ref()?;
        let peer = call.peer.clone()?;
        Some((call.id, peer, call.session.remote_user_id.clone()))
    }

    async fn peer_for(&self, id: u64) -> Option<(Arc<PeerConnectionManager>, UserId)> {
        self.current_peer()
            .await
            .filter(|(current, _, _)| *current == id)
            .map(|(_, peer, remote)| (peer, remote))
    }

    async fn send(&self, signal: OutgoingSignal) -> Result<(), SignalingError> {
        debug!("--> {} to {}", signal.event(), signal.recipient());
        self.signaling.send(signal).await
    }

    async fn send_best_effort(&self, signal: OutgoingSignal) {
        let event = signal.event();
        if let Err(e) = self.send(signal).await {
            warn!("Failed to send {}: {}", event, e);
        }
    }
}

async fn sample_loop(manager: Weak<CallManager>, id: u64, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(manager) = manager.upgrade() else {
            break;
        };
        if manager.sample_outbound_media(id).await == WatchdogAction::Stop {
            break;
        }
    }
    debug!("Stats sampling for session {} stopped", id);
}
