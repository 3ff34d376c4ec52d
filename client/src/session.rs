//! Session context: one participant's view of the shared surface.
//!
//! SYSTEM CONTEXT
//! ==============
//! A [`Session`] owns the connection manager, the local store, the stroke
//! task, and a pump task. The pump is the only reader of the connection: it
//! dispatches inbound frames, announces `join` on every transition into
//! `Open`, reconciles presence against the roster, and turns connection
//! changes into [`Notice`]s.
//!
//! There is no global connection. Whoever starts a session owns it, and
//! [`Session::logout`] (or dropping the session) closes it.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use envelope::{Envelope, Participant};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::draw::{StrokeInput, StrokeTransmitter, Throttle, spawn_stroke_task};
use crate::net::api::{RosterClient, RosterError, RosterSource};
use crate::net::connection::{ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState, SendRejected};
use crate::net::dispatch::Dispatcher;
use crate::net::transport::Transport;
use crate::notice::Notice;
use crate::render::Renderer;
use crate::state::SessionStore;
use crate::state::chat::{ChatDraft, ChatEntry, ChatError, compose};
use crate::state::presence::JoinAnnouncer;

/// Time `logout` waits for the close handshake.
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared renderer slot.
pub type SharedRenderer = Arc<Mutex<dyn Renderer>>;

/// A running session.
pub struct Session {
    me: Participant,
    manager: ConnectionManager,
    store: Arc<Mutex<SessionStore>>,
    renderer: SharedRenderer,
    strokes: StrokeInput,
    notices: mpsc::UnboundedReceiver<Notice>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start a session against the relay in `config`, fetching the roster
    /// over HTTP.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError`] if the roster HTTP client cannot be built.
    pub fn start(
        config: ClientConfig,
        me: Participant,
        transport: Arc<dyn Transport>,
        renderer: SharedRenderer,
    ) -> Result<Self, RosterError> {
        let roster: Arc<dyn RosterSource> = Arc::new(RosterClient::new(config.endpoint.roster_url())?);
        Ok(Self::start_with_roster(config, me, transport, Some(roster), renderer))
    }

    /// Start a session with an explicit roster source. `None` relies on
    /// join/leave pushes alone.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start_with_roster(
        config: ClientConfig,
        me: Participant,
        transport: Arc<dyn Transport>,
        roster: Option<Arc<dyn RosterSource>>,
        renderer: SharedRenderer,
    ) -> Self {
        let manager = ConnectionManager::new(config.endpoint.ws_url(), config.reconnect, transport);
        let store = Arc::new(Mutex::new(SessionStore::new(me.id.clone())));

        let transmitter = StrokeTransmitter::new(me.clone(), Throttle::new(config.throttle))
            .with_flush_on_release(config.flush_on_release);
        let (strokes, stroke_task) = spawn_stroke_task(transmitter, Arc::new(manager.clone()));

        let (notices_tx, notices) = mpsc::unbounded_channel();
        let pump = Pump {
            announcer: JoinAnnouncer::new(me.clone()),
            dispatcher: Dispatcher::new(me.id.clone()),
            store: Arc::clone(&store),
            renderer: Arc::clone(&renderer),
            roster,
            roster_task: None,
            notices: notices_tx,
        };
        let handle = manager.acquire();
        let pump_task = tokio::spawn(pump.run(handle, config.roster_refresh));

        info!(id = %me.id, name = %me.player_name, url = %manager.url(), "session: started");
        Self { me, manager, store, renderer, strokes, notices, tasks: vec![stroke_task, pump_task] }
    }

    /// The local participant.
    #[must_use]
    pub fn me(&self) -> &Participant {
        &self.me
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Other participants currently online, sorted by name.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.store).presence.participants()
    }

    /// Snapshot of the chat history.
    #[must_use]
    pub fn chat(&self) -> Vec<ChatEntry> {
        lock(&self.store).chat.entries().to_vec()
    }

    /// Pointer input for the local pen.
    #[must_use]
    pub fn strokes(&self) -> &StrokeInput {
        &self.strokes
    }

    /// Wait for the next notice. `None` once the session has stopped.
    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    /// Next notice if one is already queued.
    pub fn try_notice(&mut self) -> Option<Notice> {
        match self.notices.try_recv() {
            Ok(notice) => Some(notice),
            Err(_) => None,
        }
    }

    /// Send the draft as a chat message.
    ///
    /// On success the entry is appended locally and the draft cleared. On
    /// failure the draft is left as typed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] for an empty or overlong draft, or when the
    /// connection is not open.
    pub fn send_chat(&self, draft: &mut ChatDraft) -> Result<ChatEntry, ChatError> {
        let payload = compose(&self.me, draft.validated()?, OffsetDateTime::now_utc());
        self.manager.send(&Envelope::Message(payload.clone()))?;

        let entry = ChatEntry::from(payload);
        lock(&self.store).chat.push(entry.clone());
        draft.clear();
        Ok(entry)
    }

    /// Clear the local surface, then ask everyone else to clear theirs.
    ///
    /// # Errors
    ///
    /// Returns [`SendRejected`] when the connection is not open. The local
    /// surface is cleared regardless.
    pub fn clear_surface(&self) -> Result<(), SendRejected> {
        lock(&self.renderer).clear_surface();
        self.manager.send(&Envelope::Clear(self.me.clone()))
    }

    /// Start over after the connection gave up.
    pub fn reconnect(&self) {
        let _handle = self.manager.acquire();
    }

    /// Close the connection and stop the session's tasks.
    pub async fn logout(mut self) {
        let mut handle = self.manager.subscribe();
        self.manager.close();
        let settled = tokio::time::timeout(LOGOUT_TIMEOUT, async {
            while handle.state() != ConnectionState::Idle {
                if handle.next_event().await.is_none() {
                    break;
                }
            }
        })
        .await;
        if settled.is_err() {
            warn!("session: close handshake did not settle");
        }
        self.stop_tasks();
        info!(id = %self.me.id, "session: logged out");
    }

    fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            self.stop_tasks();
            self.manager.close();
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// PUMP
// =============================================================================

struct Pump {
    announcer: JoinAnnouncer,
    dispatcher: Dispatcher,
    store: Arc<Mutex<SessionStore>>,
    renderer: SharedRenderer,
    roster: Option<Arc<dyn RosterSource>>,
    roster_task: Option<JoinHandle<()>>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Pump {
    async fn run(mut self, mut handle: ConnectionHandle, roster_refresh: Option<Duration>) {
        let mut refresh = roster_refresh.filter(|period| !period.is_zero()).map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    Some(ConnectionEvent::State(state)) => self.on_state(state, &handle),
                    Some(ConnectionEvent::Frame(text)) => self.on_frame(&text),
                    None => break,
                },
                () = tick(refresh.as_mut()) => {
                    if handle.state() == ConnectionState::Open {
                        self.refresh_roster();
                    }
                }
            }
        }
        debug!("session: pump stopped");
    }

    fn on_state(&mut self, state: ConnectionState, handle: &ConnectionHandle) {
        if self.announcer.observe(handle.manager().open_link(), handle) {
            debug!("session: join announced");
        }
        match state {
            ConnectionState::Open => {
                self.notify(Notice::Connected);
                self.refresh_roster();
            }
            ConnectionState::Reconnecting { attempt, next_delay } => {
                self.notify(Notice::Reconnecting { attempt, delay: next_delay });
            }
            ConnectionState::Failed => self.notify(Notice::ReconnectExhausted),
            ConnectionState::Idle | ConnectionState::Connecting | ConnectionState::Closing => {}
        }
    }

    fn on_frame(&self, text: &str) {
        let notice = {
            let mut store = lock(&self.store);
            let mut renderer = lock(&self.renderer);
            self.dispatcher.dispatch_frame(text, &mut store, &mut *renderer)
        };
        if let Some(notice) = notice {
            self.notify(notice);
        }
    }

    fn notify(&self, notice: Notice) {
        notify(&self.notices, notice);
    }

    /// Fetch the roster in the background and reconcile when it arrives.
    fn refresh_roster(&mut self) {
        let Some(roster) = self.roster.clone() else {
            return;
        };
        if let Some(previous) = self.roster_task.take() {
            previous.abort();
        }
        let requested_at = lock(&self.store).presence.generation();
        let store = Arc::clone(&self.store);
        let notices = self.notices.clone();
        self.roster_task = Some(tokio::spawn(async move {
            match roster.fetch().await {
                Ok(participants) => {
                    let outcome = lock(&store).presence.reconcile(participants, requested_at);
                    debug!(
                        added = outcome.added.len(),
                        removed = outcome.removed.len(),
                        "session: roster reconciled"
                    );
                    for participant in outcome.added {
                        notify(&notices, Notice::PlayerJoined(participant));
                    }
                    for participant in outcome.removed {
                        notify(&notices, Notice::PlayerLeft(participant));
                    }
                }
                Err(error) => warn!(%error, "session: roster fetch failed"),
            }
        }));
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        if let Some(task) = self.roster_task.take() {
            task.abort();
        }
    }
}

fn notify(notices: &mpsc::UnboundedSender<Notice>, notice: Notice) {
    info!(%notice, "session: notice");
    if notices.send(notice).is_err() {
        debug!("session: notice receiver gone");
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
