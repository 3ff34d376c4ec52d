use super::*;
use crate::config::Endpoint;
use crate::net::backoff::ReconnectPolicy;
use crate::net::fake::{FakeTransport, Plan, Peer, accept};
use crate::render::StrokeSegment;
use envelope::{Decoded, PathPayload, Point};
use tokio::time::timeout;

#[derive(Default)]
struct RecordingRenderer {
    segments: Vec<StrokeSegment>,
    clears: usize,
}

impl Renderer for RecordingRenderer {
    fn draw_segment(&mut self, segment: &StrokeSegment) {
        self.segments.push(segment.clone());
    }

    fn clear_surface(&mut self) {
        self.clears += 1;
    }
}

struct FixedRoster(Vec<Participant>);

#[async_trait::async_trait]
impl RosterSource for FixedRoster {
    async fn fetch(&self) -> Result<Vec<Participant>, RosterError> {
        Ok(self.0.clone())
    }
}

/// Answers with a snapshot taken at request time, after `delay`.
struct SlowRoster {
    delay: Duration,
    snapshot: Vec<Participant>,
}

#[async_trait::async_trait]
impl RosterSource for SlowRoster {
    async fn fetch(&self) -> Result<Vec<Participant>, RosterError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.snapshot.clone())
    }
}

fn me() -> Participant {
    Participant::new("p-1", "Ann", "🦊")
}

fn bo() -> Participant {
    Participant::new("p-2", "Bo", "🐸")
}

fn config() -> ClientConfig {
    let mut config = ClientConfig::new(Endpoint::parse("http://test.invalid").expect("origin"));
    config.roster_refresh = None;
    config
}

struct Harness {
    session: Session,
    renderer: Arc<Mutex<RecordingRenderer>>,
    transport: Arc<FakeTransport>,
    peers: mpsc::UnboundedReceiver<Peer>,
}

fn start(config: ClientConfig, plan: &[Plan], roster: Option<Arc<dyn RosterSource>>) -> Harness {
    let (transport, peers) = FakeTransport::new(plan);
    let renderer = Arc::new(Mutex::new(RecordingRenderer::default()));
    let shared: SharedRenderer = renderer.clone();
    let session = Session::start_with_roster(config, me(), transport.clone(), roster, shared);
    Harness { session, renderer, transport, peers }
}

async fn next_notice(session: &mut Session) -> Notice {
    timeout(Duration::from_secs(120), session.next_notice())
        .await
        .expect("notice timed out")
        .expect("session alive")
}

fn decode(text: &str) -> Envelope {
    match envelope::decode(text).expect("client frames decode") {
        Decoded::Envelope(envelope) => envelope,
        Decoded::Unknown { kind } => panic!("unexpected kind {kind}"),
    }
}

#[tokio::test(start_paused = true)]
async fn join_is_announced_once_the_connection_opens() {
    let mut h = start(config(), &[Plan::Accept], None);
    assert_eq!(next_notice(&mut h.session).await, Notice::Connected);

    let mut peer = accept(&mut h.peers).await;
    assert_eq!(decode(&peer.recv().await), Envelope::Join(me()));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(peer.from_client.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn join_is_announced_again_after_reconnect() {
    let mut h = start(config(), &[Plan::Accept, Plan::Accept], None);
    assert_eq!(next_notice(&mut h.session).await, Notice::Connected);
    let mut first = accept(&mut h.peers).await;
    first.recv().await;
    first.disconnect();

    assert_eq!(
        next_notice(&mut h.session).await,
        Notice::Reconnecting { attempt: 1, delay: Duration::from_millis(1000) }
    );
    assert_eq!(next_notice(&mut h.session).await, Notice::Connected);
    let mut second = accept(&mut h.peers).await;
    assert_eq!(decode(&second.recv().await), Envelope::Join(me()));
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_raise_a_persistent_notice() {
    let mut config = config();
    config.reconnect = ReconnectPolicy::new(Duration::from_millis(10), 2);
    let mut h = start(config, &[Plan::Refuse], None);

    let mut last = None;
    while last != Some(Notice::ReconnectExhausted) {
        last = Some(next_notice(&mut h.session).await);
    }
    assert!(last.is_some_and(|notice| notice.is_persistent()));
    assert_eq!(h.session.state(), ConnectionState::Failed);
    assert_eq!(h.transport.connects(), 3);

    h.transport.push_plan(Plan::Accept);
    h.session.reconnect();
    assert_eq!(next_notice(&mut h.session).await, Notice::Connected);
}

#[tokio::test(start_paused = true)]
async fn peer_join_and_leave_update_presence_and_notify() {
    let mut h = start(config(), &[Plan::Accept], None);
    next_notice(&mut h.session).await;
    let peer = accept(&mut h.peers).await;

    peer.push(&envelope::encode(&Envelope::PlayerJoin(bo())));
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerJoined(bo()));
    assert_eq!(h.session.participants(), [bo()]);

    peer.push(&envelope::encode(&Envelope::PlayerJoin(bo())));
    peer.push("{not json");
    peer.push(&envelope::encode(&Envelope::PlayerLeave(bo())));
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerLeft(bo()));
    assert!(h.session.participants().is_empty());
}

#[tokio::test(start_paused = true)]
async fn roster_is_reconciled_on_open() {
    let roster: Arc<dyn RosterSource> = Arc::new(FixedRoster(vec![bo(), me()]));
    let mut h = start(config(), &[Plan::Accept], Some(roster));
    assert_eq!(next_notice(&mut h.session).await, Notice::Connected);
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerJoined(bo()));
    assert_eq!(h.session.participants(), [bo()]);
}

#[tokio::test(start_paused = true)]
async fn slow_roster_does_not_erase_a_join_pushed_meanwhile() {
    let roster: Arc<dyn RosterSource> =
        Arc::new(SlowRoster { delay: Duration::from_millis(500), snapshot: Vec::new() });
    let mut h = start(config(), &[Plan::Accept], Some(roster));
    assert_eq!(next_notice(&mut h.session).await, Notice::Connected);
    let peer = accept(&mut h.peers).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    peer.push(&envelope::encode(&Envelope::PlayerJoin(bo())));
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerJoined(bo()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.session.participants(), [bo()]);
    assert_eq!(h.session.try_notice(), None);
}

#[tokio::test(start_paused = true)]
async fn slow_roster_does_not_revive_a_leave_pushed_meanwhile() {
    let roster: Arc<dyn RosterSource> =
        Arc::new(SlowRoster { delay: Duration::from_millis(500), snapshot: vec![bo()] });
    let mut h = start(config(), &[Plan::Accept], Some(roster));
    assert_eq!(next_notice(&mut h.session).await, Notice::Connected);
    let peer = accept(&mut h.peers).await;

    peer.push(&envelope::encode(&Envelope::PlayerJoin(bo())));
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerJoined(bo()));
    peer.push(&envelope::encode(&Envelope::PlayerLeave(bo())));
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerLeft(bo()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.session.participants().is_empty());
    assert_eq!(h.session.try_notice(), None);
}

#[tokio::test(start_paused = true)]
async fn periodic_roster_refresh_repairs_a_lost_leave() {
    let mut config = config();
    config.roster_refresh = Some(Duration::from_secs(30));
    let roster: Arc<dyn RosterSource> = Arc::new(FixedRoster(Vec::new()));
    let mut h = start(config, &[Plan::Accept], Some(roster));
    next_notice(&mut h.session).await;
    let peer = accept(&mut h.peers).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    peer.push(&envelope::encode(&Envelope::PlayerJoin(bo())));
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerJoined(bo()));

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(next_notice(&mut h.session).await, Notice::PlayerLeft(bo()));
    assert!(h.session.participants().is_empty());
}

#[tokio::test(start_paused = true)]
async fn inbound_strokes_and_clear_reach_the_renderer() {
    let mut h = start(config(), &[Plan::Accept], None);
    next_notice(&mut h.session).await;
    let peer = accept(&mut h.peers).await;

    peer.push(&envelope::encode(&Envelope::Path(PathPayload {
        points: vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)],
        id: "p-2".to_owned(),
        player_name: "Bo".to_owned(),
        player_emoji: "🐸".to_owned(),
        color: "#00FF00".to_owned(),
        stroke_width: 3.0,
    })));
    peer.push(&envelope::encode(&Envelope::Clear(bo())));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let renderer = h.renderer.lock().unwrap();
    assert_eq!(renderer.segments.len(), 1);
    assert_eq!(renderer.clears, 1);
}

#[tokio::test(start_paused = true)]
async fn send_chat_appends_locally_and_clears_draft() {
    let mut h = start(config(), &[Plan::Accept], None);
    next_notice(&mut h.session).await;
    let mut peer = accept(&mut h.peers).await;
    peer.recv().await;

    let mut draft = ChatDraft::new("  hello  ");
    let entry = h.session.send_chat(&mut draft).expect("open connection");
    assert_eq!(entry.text, "hello");
    assert_eq!(draft.text(), "");
    assert_eq!(h.session.chat(), [entry.clone()]);

    let Envelope::Message(chat) = decode(&peer.recv().await) else {
        panic!("expected chat frame");
    };
    assert_eq!(chat.id, entry.id);
    assert_eq!(chat.player_id.as_deref(), Some("p-1"));
}

#[tokio::test(start_paused = true)]
async fn send_chat_while_disconnected_keeps_the_draft() {
    let h = start(config(), &[], None);
    let mut draft = ChatDraft::new("hello");
    assert_eq!(
        h.session.send_chat(&mut draft),
        Err(ChatError::Rejected(SendRejected::NotConnected))
    );
    assert_eq!(draft.text(), "hello");
    assert!(h.session.chat().is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_surface_clears_locally_then_broadcasts() {
    let mut h = start(config(), &[Plan::Accept], None);
    next_notice(&mut h.session).await;
    let mut peer = accept(&mut h.peers).await;
    peer.recv().await;

    h.session.clear_surface().expect("open connection");
    assert_eq!(h.renderer.lock().unwrap().clears, 1);
    assert_eq!(decode(&peer.recv().await), Envelope::Clear(me()));
}

#[tokio::test(start_paused = true)]
async fn local_gesture_is_sent_as_throttled_path() {
    let mut h = start(config(), &[Plan::Accept], None);
    next_notice(&mut h.session).await;
    let mut peer = accept(&mut h.peers).await;
    peer.recv().await;

    let strokes = h.session.strokes();
    strokes.press(10.0, 10.0);
    strokes.move_to(20.0, 10.0);
    strokes.move_to(30.0, 10.0);

    let Envelope::Path(path) = decode(&peer.recv().await) else {
        panic!("expected path frame");
    };
    assert_eq!(path.points, [Point::new(10.0, 10.0), Point::new(20.0, 10.0), Point::new(30.0, 10.0)]);
    assert_eq!(path.id, "p-1");
}

#[tokio::test(start_paused = true)]
async fn logout_closes_the_connection() {
    let mut h = start(config(), &[Plan::Accept, Plan::Accept], None);
    next_notice(&mut h.session).await;
    let _peer = accept(&mut h.peers).await;

    let manager = h.session.connection().clone();
    h.session.logout().await;
    assert_eq!(manager.state(), ConnectionState::Idle);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.transport.connects(), 1);
}
