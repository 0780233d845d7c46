use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::calls::{
    CallManager, CallManagerConfig, LocalTrack, MediaDevices, MediaError, MediaHandle,
    PeerConnection, PeerConnectionFactory, PeerError, PeerEvent, PeerEventSink,
    SessionPeerEvent, SignalingChannel, SignalingError,
};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::ice::IceConfig;
use crate::ice_config::{IceConfigService, IceFetchConfig};
use crate::types::events::CallEvent;
use crate::types::{IceCandidate, IncomingSignal, OutgoingSignal, SessionDescription, TrackKind, UserId};
use crate::watchdog::OutboundSample;

type CannedResponse = Result<(u16, &'static str), &'static str>;

/// HTTP client replaying canned responses in order. Once they run out every
/// request fails.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<CannedResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn with_responses(responses: Vec<CannedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok((status_code, body))) => Ok(HttpResponse {
                status_code,
                body: body.as_bytes().to_vec(),
            }),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Err(anyhow::anyhow!("Not implemented")),
        }
    }
}

/// Peer connection calls recorded by [`MockPeerConnection`]. Candidates are
/// kept apart, see [`MockPeerConnection::applied_candidates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    AddTrack(TrackKind),
    AddRecvOnly(TrackKind),
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    Close,
}

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

pub struct MockPeerConnection {
    id: u64,
    ice: IceConfig,
    events: PeerEventSink,
    ops: Mutex<Vec<MockOp>>,
    candidates: Mutex<Vec<IceCandidate>>,
    descriptions: AtomicU64,
    remote_set: AtomicBool,
    reject_candidates: AtomicBool,
    fail_offers: AtomicBool,
    stats: Mutex<OutboundSample>,
    stats_reads: AtomicUsize,
    track_gate: Mutex<Option<oneshot::Receiver<()>>>,
    track_held: AtomicBool,
}

impl MockPeerConnection {
    fn new(
        ice: IceConfig,
        events: PeerEventSink,
        track_gate: Option<oneshot::Receiver<()>>,
    ) -> Self {
        Self {
            id: NEXT_CONNECTION.fetch_add(1, Ordering::SeqCst),
            ice,
            events,
            ops: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            descriptions: AtomicU64::new(0),
            remote_set: AtomicBool::new(false),
            reject_candidates: AtomicBool::new(false),
            fail_offers: AtomicBool::new(false),
            stats: Mutex::new(OutboundSample::default()),
            stats_reads: AtomicUsize::new(0),
            track_gate: Mutex::new(track_gate),
            track_held: AtomicBool::new(false),
        }
    }

    pub fn ops(&self) -> Vec<MockOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&MockOp) -> bool) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| pred(op)).count()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                MockOp::SetRemote(desc) => Some(desc),
                _ => None,
            })
            .collect()
    }

    pub fn reject_candidates(&self, reject: bool) {
        self.reject_candidates.store(reject, Ordering::SeqCst);
    }

    pub fn fail_offers(&self, fail: bool) {
        self.fail_offers.store(fail, Ordering::SeqCst);
    }

    pub fn set_stats(&self, sample: OutboundSample) {
        *self.stats.lock().unwrap() = sample;
    }

    pub fn stats_reads(&self) -> usize {
        self.stats_reads.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.count(|op| matches!(op, MockOp::Close)) > 0
    }

    /// Whether an `add_track` is suspended on the factory's hold.
    pub fn is_holding_track(&self) -> bool {
        self.track_held.load(Ordering::SeqCst)
    }

    pub fn ice(&self) -> &IceConfig {
        &self.ice
    }

    pub fn session(&self) -> u64 {
        self.events.session()
    }

    /// Reports a gathered local candidate, as the ICE agent would.
    pub fn discover(&self, candidate: IceCandidate) {
        self.events.emit(PeerEvent::CandidateDiscovered(candidate));
    }

    pub fn set_ice_connected(&self, connected: bool) {
        self.events.emit(PeerEvent::IceStateChanged {
            connected,
            state: if connected { "connected" } else { "disconnected" }.to_string(),
        });
    }

    pub fn fail_connection(&self, reason: &str) {
        self.events
            .emit(PeerEvent::ConnectionFailed(reason.to_string()));
    }

    pub fn start_remote_track(&self, kind: TrackKind) {
        self.events.emit(PeerEvent::RemoteTrack(kind));
    }

    fn record(&self, op: MockOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn next_description(&self) -> u64 {
        self.descriptions.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerError> {
        let gate = self.track_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.track_held.store(true, Ordering::SeqCst);
            let _ = gate.await;
            self.track_held.store(false, Ordering::SeqCst);
        }
        // Like webrtc-rs, a closed connection refuses new tracks.
        if self.is_closed() {
            return Err(PeerError::WebRtc(webrtc::Error::ErrConnectionClosed));
        }
        self.record(MockOp::AddTrack(track.kind()));
        Ok(())
    }

    async fn add_recv_only(&self, kind: TrackKind) -> Result<(), PeerError> {
        self.record(MockOp::AddRecvOnly(kind));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        self.record(MockOp::CreateOffer);
        if self.fail_offers.load(Ordering::SeqCst) {
            return Err(PeerError::ConnectionFailed("offer creation failed".into()));
        }
        Ok(SessionDescription::offer(format!(
            "offer-{}-{}",
            self.id,
            self.next_description()
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        self.record(MockOp::CreateAnswer);
        Ok(SessionDescription::answer(format!(
            "answer-{}-{}",
            self.id,
            self.next_description()
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.record(MockOp::SetLocal(desc));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.record(MockOp::SetRemote(desc));
        self.remote_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        if !self.remote_set.load(Ordering::SeqCst) {
            return Err(PeerError::RemoteDescriptionMissing);
        }
        if self.reject_candidates.load(Ordering::SeqCst) {
            return Err(PeerError::ConnectionFailed("candidate rejected".into()));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn media_stats(&self) -> Result<OutboundSample, PeerError> {
        self.stats_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.stats.lock().unwrap())
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.record(MockOp::Close);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPeerFactory {
    created: Mutex<Vec<Arc<MockPeerConnection>>>,
    fail_next: AtomicBool,
    track_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Suspends the first `add_track` of the next connection until the
    /// returned sender fires or is dropped.
    pub fn hold_next_track(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.track_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn last(&self) -> Option<Arc<MockPeerConnection>> {
        self.created.lock().unwrap().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerFactory {
    async fn create(
        &self,
        ice: &IceConfig,
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PeerError::ConnectionFailed("mock factory failure".into()));
        }
        let gate = self.track_gate.lock().unwrap().take();
        let pc = Arc::new(MockPeerConnection::new(ice.clone(), events, gate));
        self.created.lock().unwrap().push(pc.clone());
        Ok(pc)
    }
}

/// Capture source without pumps. Records every handle it gives out.
#[derive(Default)]
pub struct MockMediaDevices {
    acquisitions: AtomicUsize,
    deny: AtomicBool,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    issued: Mutex<Vec<MediaHandle>>,
}

impl MockMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes acquisitions fail as if the user refused access.
    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Suspends the next acquisition until the returned sender fires or is
    /// dropped.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn issued(&self) -> Vec<MediaHandle> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn acquire(&self, want_video: bool) -> Result<MediaHandle, MediaError> {
        let n = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied(TrackKind::Audio));
        }

        let stream_id = format!("mock-{n}");
        let mut tracks = vec![Arc::new(LocalTrack::new(TrackKind::Audio, &stream_id))];
        if want_video {
            tracks.push(Arc::new(LocalTrack::new(TrackKind::Video, &stream_id)));
        }
        let media = MediaHandle::new(stream_id, tracks);
        self.issued.lock().unwrap().push(media.clone());
        Ok(media)
    }
}

/// Signaling channel that keeps what was sent.
#[derive(Default)]
pub struct RecordingSignaling {
    sent: Mutex<Vec<OutgoingSignal>>,
    fail: AtomicBool,
}

impl RecordingSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Signals sent since the last call.
    pub fn take_sent(&self) -> Vec<OutgoingSignal> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl SignalingChannel for RecordingSignaling {
    async fn send(&self, signal: OutgoingSignal) -> Result<(), SignalingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SignalingError::Send {
                event: signal.event(),
                reason: "mock relay unreachable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(signal);
        Ok(())
    }
}

pub fn audio_only_media() -> MediaHandle {
    MediaHandle::new(
        "test-stream",
        vec![Arc::new(LocalTrack::new(TrackKind::Audio, "test-stream"))],
    )
}

pub fn test_candidate(n: u32) -> IceCandidate {
    IceCandidate::new(format!("candidate:{n} 1 udp {n} 10.0.0.{n} 9 typ host"))
        .with_sdp_mid("0")
        .with_sdp_m_line_index(0)
}

const TEST_ICE_BODY: &str = r#"{"iceServers":[{"urls":"stun:stun.test:3478"}]}"#;

/// One client wired to mocks: call manager, signaling, devices and peer
/// connections. Peer events are only processed by [`TestPeer::pump`].
pub struct TestPeer {
    pub manager: Arc<CallManager>,
    pub signaling: Arc<RecordingSignaling>,
    pub devices: Arc<MockMediaDevices>,
    pub peers: Arc<MockPeerFactory>,
    events: broadcast::Receiver<CallEvent>,
    peer_events: mpsc::UnboundedReceiver<SessionPeerEvent>,
}

impl TestPeer {
    /// A client without periodic stats sampling.
    pub fn new(user: &str) -> Self {
        Self::with_config(
            user,
            CallManagerConfig {
                watchdog: None,
                ..Default::default()
            },
        )
    }

    pub fn with_config(user: &str, config: CallManagerConfig) -> Self {
        let signaling = Arc::new(RecordingSignaling::new());
        let devices = Arc::new(MockMediaDevices::new());
        let peers = Arc::new(MockPeerFactory::new());
        let http = Arc::new(MockHttpClient::with_responses(vec![Ok((200, TEST_ICE_BODY))]));
        let ice = Arc::new(IceConfigService::new(
            http,
            IceFetchConfig::new("http://api.test", None),
        ));

        let (manager, peer_events) = CallManager::new(
            UserId::new(user),
            config,
            signaling.clone(),
            devices.clone(),
            peers.clone(),
            ice,
        );
        let events = manager.subscribe();
        Self {
            manager,
            signaling,
            devices,
            peers,
            events,
            peer_events,
        }
    }

    pub fn user(&self) -> UserId {
        self.manager.local_user().clone()
    }

    pub async fn deliver(&self, signal: IncomingSignal) {
        self.manager.handle_signal(signal).await;
    }

    /// Hands every queued peer connection event to the manager.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.peer_events.try_recv() {
            self.manager.handle_peer_event(event).await;
        }
    }

    /// UI events published since the last call.
    pub fn events(&mut self) -> Vec<CallEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn sent(&self) -> Vec<OutgoingSignal> {
        self.signaling.take_sent()
    }

    pub fn sent_events(&self) -> Vec<&'static str> {
        self.sent().iter().map(OutgoingSignal::event).collect()
    }

    /// The most recently created peer connection.
    pub fn connection(&self) -> Arc<MockPeerConnection> {
        self.peers.last().expect("no peer connection was created")
    }
}

/// Forwards everything `from` has sent to `to` the way the relay would.
/// Returns the delivered event names.
pub async fn relay(from: &TestPeer, to: &TestPeer) -> Vec<&'static str> {
    let mut delivered = Vec::new();
    for signal in from.sent() {
        let (recipient, incoming) = signal
            .into_envelope(from.user())
            .deliver()
            .expect("envelope payload does not match its type");
        assert_eq!(recipient, to.user(), "signal addressed to someone else");
        delivered.push(incoming.event());
        to.deliver(incoming).await;
    }
    delivered
}
