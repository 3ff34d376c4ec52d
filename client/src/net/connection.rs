//! Connection manager: one logical websocket connection and its lifecycle.
//!
//! The `ConnectionManager` owns at most one live socket at a time. It runs a
//! driver task per acquisition that connects, pumps frames, and reconnects
//! with exponential backoff after unclean closes.
//!
//! STATE MACHINE
//! =============
//! ```text
//! Idle ──acquire──▶ Connecting ──opened──▶ Open ──close()──▶ Closing ──▶ Idle
//!                       ▲                   │
//!                       │             unclean close / connect error
//!                       │                   ▼
//!                       └──delay elapsed── Reconnecting(attempt, delay)
//!                                           │ attempt > max
//!                                           ▼
//!                                         Failed
//! ```
//! `close()` from any state lands in `Idle` and cancels pending timers.
//!
//! BACKPRESSURE
//! ============
//! `send()` only succeeds while `Open`. Nothing is queued across reconnects;
//! callers get `SendRejected` and decide whether to drop or retry.
//!
//! Every driver carries the epoch of the acquisition that spawned it. State
//! writes are epoch-guarded so a superseded driver can never clobber state.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use envelope::Envelope;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::ReconnectPolicy;
use super::transport::{Link, Transport, TransportError};

/// Time allowed for the close handshake before the socket is dropped.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Capacity of the state-transition broadcast.
const STATE_EVENT_CAPACITY: usize = 64;

/// Default capacity of the inbound frame broadcast.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Lifecycle state of the logical connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none wanted.
    #[default]
    Idle,
    /// Socket handshake in progress.
    Connecting,
    /// Socket open; `send()` succeeds.
    Open,
    /// `close()` requested on an open socket; close handshake in flight.
    Closing,
    /// Waiting `next_delay` before reconnect attempt `attempt`.
    Reconnecting { attempt: u32, next_delay: Duration },
    /// Reconnect attempts exhausted. Terminal until the next `acquire()`.
    Failed,
}

/// `send()` was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    #[error("not connected")]
    NotConnected,
}

/// Anything that accepts outgoing envelopes.
pub trait EnvelopeSink: Send + Sync {
    /// Send one envelope now, or report why it was not sent.
    ///
    /// # Errors
    ///
    /// Returns [`SendRejected`] when the envelope cannot be transmitted.
    fn send(&self, envelope: &Envelope) -> Result<(), SendRejected>;
}

/// Something observed on a [`ConnectionHandle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection moved to a new state.
    State(ConnectionState),
    /// One inbound text frame, not yet decoded.
    Frame(String),
}

/// Owner of the single logical connection.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    states: broadcast::Sender<ConnectionState>,
    inbound: broadcast::Sender<String>,
    shared: Mutex<Shared>,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    epoch: u64,
    /// Times `Open` was entered; identifies the current link.
    links: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    stop: Option<oneshot::Sender<u64>>,
    driver: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, transport: Arc<dyn Transport>) -> Self {
        Self::with_inbound_capacity(url, policy, transport, DEFAULT_INBOUND_CAPACITY)
    }

    #[must_use]
    pub fn with_inbound_capacity(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        transport: Arc<dyn Transport>,
        inbound_capacity: usize,
    ) -> Self {
        let (states, _) = broadcast::channel(STATE_EVENT_CAPACITY);
        let (inbound, _) = broadcast::channel(inbound_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                policy,
                transport,
                states,
                inbound,
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Identifier of the open link, or `None` unless `Open`. Each entry
    /// into `Open` gets a new identifier.
    #[must_use]
    pub fn open_link(&self) -> Option<u64> {
        let shared = self.inner.lock();
        (shared.state == ConnectionState::Open).then_some(shared.links)
    }

    /// Websocket URL this manager connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Subscribe to state changes and inbound frames without starting a
    /// connection.
    #[must_use]
    pub fn subscribe(&self) -> ConnectionHandle {
        ConnectionHandle {
            manager: self.clone(),
            states: self.inner.states.subscribe(),
            inbound: self.inner.inbound.subscribe(),
        }
    }

    /// Ensure a connection is wanted and return a subscription to it.
    ///
    /// Starts a fresh driver from `Idle`, `Failed` or `Closing`; a driver
    /// that is still finishing a close is aborted first. In every other state
    /// the existing connection is reused.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn acquire(&self) -> ConnectionHandle {
        let handle = self.subscribe();

        let mut shared = self.inner.lock();
        if matches!(
            shared.state,
            ConnectionState::Idle | ConnectionState::Failed | ConnectionState::Closing
        ) {
            if let Some(driver) = shared.driver.take() {
                driver.abort();
            }
            shared.epoch += 1;
            let epoch = shared.epoch;
            let (stop_tx, stop_rx) = oneshot::channel();
            shared.stop = Some(stop_tx);
            self.inner.set_state(&mut shared, ConnectionState::Connecting);
            shared.driver = Some(tokio::spawn(drive(Arc::clone(&self.inner), epoch, stop_rx)));
        }

        handle
    }

    /// Send one envelope on the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`SendRejected::NotConnected`] unless the state is `Open`.
    pub fn send(&self, envelope: &Envelope) -> Result<(), SendRejected> {
        let text = envelope::encode(envelope);
        let shared = self.inner.lock();
        let outbound = match (&shared.state, &shared.outbound) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            _ => {
                debug!(kind = %envelope.kind(), state = ?shared.state, "ws: send rejected");
                return Err(SendRejected::NotConnected);
            }
        };
        outbound.send(text).map_err(|_| SendRejected::NotConnected)
    }

    /// Close the connection and stop reconnecting.
    ///
    /// An open socket passes through `Closing` while the close handshake is
    /// flushed; every other state goes straight to `Idle`.
    pub fn close(&self) {
        let mut shared = self.inner.lock();
        shared.epoch += 1;
        let close_epoch = shared.epoch;
        shared.outbound = None;

        let handshake = shared.state == ConnectionState::Open && shared.driver.is_some();
        if let Some(stop) = shared.stop.take() {
            if stop.send(close_epoch).is_err() {
                debug!("ws: driver already stopped");
            }
        }
        let next = if handshake { ConnectionState::Closing } else { ConnectionState::Idle };
        self.inner.set_state(&mut shared, next);
    }
}

impl EnvelopeSink for ConnectionManager {
    fn send(&self, envelope: &Envelope) -> Result<(), SendRejected> {
        ConnectionManager::send(self, envelope)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, shared: &mut Shared, next: ConnectionState) {
        if shared.state == next {
            return;
        }
        if next != ConnectionState::Open {
            shared.outbound = None;
        }
        info!(from = ?shared.state, to = ?next, url = %self.url, "ws: state");
        shared.state = next;
        if self.states.send(next).is_err() {
            debug!("ws: no state subscribers");
        }
    }

    /// Apply a driver transition if `epoch` is still current.
    fn transition(&self, epoch: u64, next: ConnectionState) -> bool {
        let mut shared = self.lock();
        if shared.epoch != epoch {
            return false;
        }
        self.set_state(&mut shared, next);
        true
    }

    /// Enter `Open` with a fresh outbound channel if `epoch` is still current.
    fn open(&self, epoch: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut shared = self.lock();
        if shared.epoch != epoch {
            return false;
        }
        shared.links += 1;
        self.set_state(&mut shared, ConnectionState::Open);
        shared.outbound = Some(outbound);
        true
    }

    /// Finish the `Closing → Idle` leg started by the `close()` that
    /// produced `close_epoch`.
    fn finish_close(&self, close_epoch: u64) {
        let mut shared = self.lock();
        if shared.epoch == close_epoch && shared.state == ConnectionState::Closing {
            self.set_state(&mut shared, ConnectionState::Idle);
        }
    }

    fn publish(&self, text: String) {
        if self.inbound.send(text).is_err() {
            debug!("ws: inbound frame with no subscribers");
        }
    }
}

/// Scoped subscription to one connection manager.
///
/// Holds a state-change receiver and an inbound-frame receiver. Dropping the
/// handle releases both. Subscriptions survive reconnects.
pub struct ConnectionHandle {
    manager: ConnectionManager,
    states: broadcast::Receiver<ConnectionState>,
    inbound: broadcast::Receiver<String>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Send through the underlying manager.
    ///
    /// # Errors
    ///
    /// Returns [`SendRejected::NotConnected`] unless the state is `Open`.
    pub fn send(&self, envelope: &Envelope) -> Result<(), SendRejected> {
        self.manager.send(envelope)
    }

    /// Wait for the next state change or inbound frame.
    ///
    /// State changes are delivered before frames when both are ready.
    /// Returns `None` once the manager is gone.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            tokio::select! {
                biased;
                state = self.states.recv() => match state {
                    Ok(state) => return Some(ConnectionEvent::State(state)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ws: state subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                frame = self.inbound.recv() => match frame {
                    Ok(text) => return Some(ConnectionEvent::Frame(text)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ws: inbound subscriber lagged, frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }
}

impl EnvelopeSink for ConnectionHandle {
    fn send(&self, envelope: &Envelope) -> Result<(), SendRejected> {
        self.manager.send(envelope)
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Why a driver stopped.
enum Exit {
    /// `close()` asked the driver to stop; carries that close's epoch.
    Stopped(u64),
    /// A newer acquisition or close took over.
    Superseded,
    /// Reconnect attempts exhausted.
    Failed,
}

/// Why an open link ended.
enum LinkEnd {
    Stopped(u64),
    Superseded,
    Lost(TransportError),
}

async fn drive(inner: Arc<Inner>, epoch: u64, mut stop: oneshot::Receiver<u64>) {
    let exit = run(&inner, epoch, &mut stop).await;
    let close_epoch = match exit {
        Exit::Stopped(close_epoch) => Some(close_epoch),
        // The link may have dropped at the same moment close() was called.
        Exit::Superseded => match stop.try_recv() {
            Ok(close_epoch) => Some(close_epoch),
            Err(_) => None,
        },
        Exit::Failed => None,
    };
    if let Some(close_epoch) = close_epoch {
        inner.finish_close(close_epoch);
    }
}

async fn run(inner: &Inner, epoch: u64, stop: &mut oneshot::Receiver<u64>) -> Exit {
    let mut attempt: u32 = 0;

    loop {
        let connected = tokio::select! {
            signal = &mut *stop => return stopped(signal),
            connected = inner.transport.connect(&inner.url) => connected,
        };

        match connected {
            Ok(link) => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                if !inner.open(epoch, outbound_tx) {
                    return Exit::Superseded;
                }
                attempt = 0;
                match pump_link(inner, link, outbound_rx, stop).await {
                    LinkEnd::Stopped(close_epoch) => return Exit::Stopped(close_epoch),
                    LinkEnd::Superseded => return Exit::Superseded,
                    LinkEnd::Lost(error) => warn!(error = %error, url = %inner.url, "ws: connection lost"),
                }
            }
            Err(error) => warn!(error = %error, url = %inner.url, "ws: connect failed"),
        }

        attempt += 1;
        let Some(delay) = inner.policy.delay_for(attempt) else {
            warn!(attempts = attempt - 1, "ws: reconnect attempts exhausted");
            inner.transition(epoch, ConnectionState::Failed);
            return Exit::Failed;
        };
        if !inner.transition(epoch, ConnectionState::Reconnecting { attempt, next_delay: delay }) {
            return Exit::Superseded;
        }

        tokio::select! {
            signal = &mut *stop => return stopped(signal),
            () = tokio::time::sleep(delay) => {}
        }

        if !inner.transition(epoch, ConnectionState::Connecting) {
            return Exit::Superseded;
        }
    }
}

/// Move frames both ways until the link drops or a stop arrives.
async fn pump_link(
    inner: &Inner,
    link: Link,
    mut outbound: mpsc::UnboundedReceiver<String>,
    stop: &mut oneshot::Receiver<u64>,
) -> LinkEnd {
    let Link { mut sink, mut stream } = link;

    loop {
        tokio::select! {
            signal = &mut *stop => {
                let Ok(close_epoch) = signal else {
                    return LinkEnd::Superseded;
                };
                // Frames accepted by send() before close() still go out.
                let drain = async {
                    while let Ok(text) = outbound.try_recv() {
                        sink.feed(text).await?;
                    }
                    sink.close().await
                };
                match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await {
                    Ok(Ok(())) => debug!("ws: closed cleanly"),
                    Ok(Err(error)) => debug!(error = %error, "ws: close handshake failed"),
                    Err(_) => debug!("ws: close handshake timed out"),
                }
                return LinkEnd::Stopped(close_epoch);
            }
            Some(text) = outbound.recv() => {
                if let Err(error) = sink.send(text).await {
                    return LinkEnd::Lost(error);
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(text)) => inner.publish(text),
                Some(Err(error)) => return LinkEnd::Lost(error),
                None => return LinkEnd::Lost(TransportError::Closed),
            },
        }
    }
}

fn stopped(signal: Result<u64, oneshot::error::RecvError>) -> Exit {
    match signal {
        Ok(close_epoch) => Exit::Stopped(close_epoch),
        Err(_) => Exit::Superseded,
    }
}
