use super::*;
use crate::net::fake::{FakeTransport, Plan, accept};
use envelope::Participant;
use tokio::time::{Instant, timeout};

const URL: &str = "ws://test.invalid/ws";

fn manager(transport: Arc<FakeTransport>) -> ConnectionManager {
    ConnectionManager::new(URL, ReconnectPolicy::default(), transport)
}

fn join_envelope() -> Envelope {
    Envelope::Join(Participant::new("p-1", "Ann", "🦊"))
}

async fn next_state(handle: &mut ConnectionHandle) -> ConnectionState {
    loop {
        let event = timeout(Duration::from_secs(120), handle.next_event())
            .await
            .expect("state change timed out")
            .expect("manager alive");
        if let ConnectionEvent::State(state) = event {
            return state;
        }
    }
}

async fn next_frame(handle: &mut ConnectionHandle) -> String {
    loop {
        let event = timeout(Duration::from_secs(5), handle.next_event())
            .await
            .expect("frame timed out")
            .expect("manager alive");
        if let ConnectionEvent::Frame(text) = event {
            return text;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn acquire_from_idle_connects_then_opens() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept]);
    let manager = manager(transport.clone());
    assert_eq!(manager.state(), ConnectionState::Idle);

    let mut handle = manager.acquire();
    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut handle).await, ConnectionState::Open);
    let _peer = accept(&mut peers).await;
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn acquire_while_open_reuses_the_connection() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept, Plan::Accept]);
    let manager = manager(transport.clone());
    let mut first = manager.acquire();
    next_state(&mut first).await;
    next_state(&mut first).await;
    let _peer = accept(&mut peers).await;

    let _second = manager.acquire();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn send_while_open_writes_one_encoded_frame() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept]);
    let manager = manager(transport);
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    let mut peer = accept(&mut peers).await;

    manager.send(&join_envelope()).expect("open connection accepts sends");

    let text = timeout(Duration::from_secs(1), peer.from_client.recv())
        .await
        .expect("frame timed out")
        .expect("frame");
    assert_eq!(text, envelope::encode(&join_envelope()));
}

#[tokio::test(start_paused = true)]
async fn send_before_acquire_is_rejected() {
    let (transport, _peers) = FakeTransport::new(&[]);
    let manager = manager(transport);
    assert_eq!(manager.send(&join_envelope()), Err(SendRejected::NotConnected));
    assert_eq!(SendRejected::NotConnected.to_string(), "not connected");
}

#[tokio::test(start_paused = true)]
async fn unclean_close_reconnects_after_base_delay() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept, Plan::Accept]);
    let manager = manager(transport.clone());
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    assert_eq!(next_state(&mut handle).await, ConnectionState::Open);
    let mut peer = accept(&mut peers).await;

    peer.disconnect();
    assert_eq!(
        next_state(&mut handle).await,
        ConnectionState::Reconnecting { attempt: 1, next_delay: Duration::from_millis(1000) }
    );
    let scheduled_at = Instant::now();
    assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
    assert_eq!(scheduled_at.elapsed(), Duration::from_millis(1000));
    assert_eq!(next_state(&mut handle).await, ConnectionState::Open);
    assert_eq!(transport.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn send_while_reconnecting_is_rejected_and_nothing_is_written() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept]);
    let manager = manager(transport);
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    let mut peer = accept(&mut peers).await;

    peer.disconnect();
    assert!(matches!(next_state(&mut handle).await, ConnectionState::Reconnecting { .. }));
    assert_eq!(manager.send(&join_envelope()), Err(SendRejected::NotConnected));
    assert!(peer.from_client.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_until_attempts_are_exhausted() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept]);
    let manager = manager(transport.clone());
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    let mut peer = accept(&mut peers).await;
    peer.disconnect();

    let mut delays = Vec::new();
    loop {
        match next_state(&mut handle).await {
            ConnectionState::Reconnecting { attempt, next_delay } => {
                assert_eq!(attempt as usize, delays.len() + 1);
                delays.push(next_delay.as_millis());
            }
            ConnectionState::Connecting => {}
            ConnectionState::Failed => break,
            other => panic!("unexpected state {other:?}"),
        }
    }

    assert_eq!(delays, [1000, 2000, 4000, 8000, 16000]);
    assert_eq!(transport.connects(), 6);

    // Failed is terminal: no timer is left behind.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.connects(), 6);
    assert_eq!(manager.state(), ConnectionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn refused_first_connect_counts_as_unclean() {
    let (transport, _peers) = FakeTransport::new(&[Plan::Refuse]);
    let manager = manager(transport);
    let mut handle = manager.acquire();
    assert_eq!(next_state(&mut handle).await, ConnectionState::Connecting);
    assert_eq!(
        next_state(&mut handle).await,
        ConnectionState::Reconnecting { attempt: 1, next_delay: Duration::from_millis(1000) }
    );
}

#[tokio::test(start_paused = true)]
async fn reaching_open_resets_the_attempt_counter() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept, Plan::Refuse, Plan::Accept]);
    let manager = manager(transport);
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    accept(&mut peers).await.disconnect();

    let mut seen = Vec::new();
    loop {
        let state = next_state(&mut handle).await;
        seen.push(state);
        if state == ConnectionState::Open {
            break;
        }
    }
    assert!(seen.contains(&ConnectionState::Reconnecting { attempt: 2, next_delay: Duration::from_millis(2000) }));

    accept(&mut peers).await.disconnect();
    assert_eq!(
        next_state(&mut handle).await,
        ConnectionState::Reconnecting { attempt: 1, next_delay: Duration::from_millis(1000) }
    );
}

#[tokio::test(start_paused = true)]
async fn explicit_close_while_open_goes_idle_without_reconnecting() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept, Plan::Accept]);
    let manager = manager(transport.clone());
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    let _peer = accept(&mut peers).await;

    manager.close();
    assert_eq!(next_state(&mut handle).await, ConnectionState::Closing);
    assert_eq!(next_state(&mut handle).await, ConnectionState::Idle);
    assert_eq!(manager.send(&join_envelope()), Err(SendRejected::NotConnected));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(manager.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn close_while_reconnecting_cancels_the_pending_attempt() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept, Plan::Accept]);
    let manager = manager(transport.clone());
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    accept(&mut peers).await.disconnect();
    assert!(matches!(next_state(&mut handle).await, ConnectionState::Reconnecting { .. }));

    manager.close();
    assert_eq!(next_state(&mut handle).await, ConnectionState::Idle);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(manager.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn acquire_after_failed_starts_over() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Refuse; 6]);
    let manager = ConnectionManager::new(URL, ReconnectPolicy::new(Duration::from_millis(10), 5), transport.clone());
    let mut handle = manager.acquire();
    while next_state(&mut handle).await != ConnectionState::Failed {}
    assert_eq!(transport.connects(), 6);

    transport.push_plan(Plan::Accept);
    let mut retry = manager.acquire();
    assert_eq!(next_state(&mut retry).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut retry).await, ConnectionState::Open);
    let _peer = accept(&mut peers).await;
}

#[tokio::test(start_paused = true)]
async fn inbound_subscription_survives_reconnect() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept, Plan::Accept]);
    let manager = manager(transport);
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;

    let mut first = accept(&mut peers).await;
    first.push("one");
    assert_eq!(next_frame(&mut handle).await, "one");
    first.disconnect();

    while next_state(&mut handle).await != ConnectionState::Open {}
    let second = accept(&mut peers).await;
    second.push("two");
    assert_eq!(next_frame(&mut handle).await, "two");
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_releases_its_subscription() {
    let (transport, _peers) = FakeTransport::new(&[]);
    let manager = manager(transport);
    let handle = manager.subscribe();
    assert_eq!(manager.inner.inbound.receiver_count(), 1);
    drop(handle);
    assert_eq!(manager.inner.inbound.receiver_count(), 0);
    assert_eq!(manager.inner.states.receiver_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_flushes_frames_sent_before_it() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept]);
    let manager = manager(transport);
    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    let mut peer = accept(&mut peers).await;

    manager.send(&join_envelope()).expect("open connection accepts sends");
    manager.close();
    assert_eq!(peer.recv().await, envelope::encode(&join_envelope()));
}

#[tokio::test(start_paused = true)]
async fn each_open_gets_a_new_link_id() {
    let (transport, mut peers) = FakeTransport::new(&[Plan::Accept, Plan::Accept]);
    let manager = manager(transport);
    assert_eq!(manager.open_link(), None);

    let mut handle = manager.acquire();
    next_state(&mut handle).await;
    next_state(&mut handle).await;
    let first = manager.open_link().expect("open");

    accept(&mut peers).await.disconnect();
    assert!(matches!(next_state(&mut handle).await, ConnectionState::Reconnecting { .. }));
    assert_eq!(manager.open_link(), None);

    while next_state(&mut handle).await != ConnectionState::Open {}
    let _peer = accept(&mut peers).await;
    let second = manager.open_link().expect("open");
    assert!(second > first);
}
