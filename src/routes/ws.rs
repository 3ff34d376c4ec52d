//! WebSocket handler: the envelope relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection id, registers an outbox in the hub and
//! enters a `select!` loop:
//! - Incoming text frames → decode → route → apply the `Outcome`
//! - Frames relayed from peers → forward to this client
//!
//! `route` is pure: it inspects one decoded envelope and says what should
//! happen. The connection loop owns every side effect.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register outbox (no identity yet)
//! 2. `join` → record identity, announce `player_join` to everyone else
//! 3. `message` / `path` / `clear` / `draw` → relayed verbatim to everyone else
//! 4. Close → announce `player_leave` if the peer had joined → unregister

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use envelope::{Decoded, Envelope, Participant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::telemetry::counters;
use crate::state::{AppState, OUTBOX_CAPACITY};

// =============================================================================
// OUTCOME
// =============================================================================

/// What the connection loop does with one inbound frame.
#[derive(Debug, PartialEq)]
enum Outcome {
    /// Record the identity and announce it to everyone else.
    Join(Participant),
    /// Forward the frame verbatim to everyone else.
    Relay,
    /// Drop the frame.
    Ignore(&'static str),
}

fn route(envelope: Envelope) -> Outcome {
    match envelope {
        Envelope::Join(participant) if participant.is_complete() => Outcome::Join(participant),
        Envelope::Join(_) => Outcome::Ignore("incomplete identity"),
        Envelope::Message(_) | Envelope::Path(_) | Envelope::Clear(_) | Envelope::Draw(_) => Outcome::Relay,
        // Presence announcements are server-authored.
        Envelope::PlayerJoin(_) | Envelope::PlayerLeave(_) => Outcome::Ignore("client-sent presence"),
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    state.register(conn_id, tx).await;
    info!(%conn_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => handle_text(&state, conn_id, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(text) = rx.recv() => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(participant) = state.unregister(conn_id).await {
        info!(%conn_id, id = %participant.id, "ws: participant left");
        state.broadcast(&envelope::encode(&Envelope::PlayerLeave(participant)), Some(conn_id)).await;
    }
    info!(%conn_id, "ws: client disconnected");
}

/// Decode one inbound text frame and apply its outcome.
async fn handle_text(state: &AppState, conn_id: Uuid, text: &str) {
    let decoded = match envelope::decode(text) {
        Ok(decoded) => decoded,
        Err(error) => {
            counters::error("decode");
            warn!(%conn_id, %error, "ws: malformed frame dropped");
            return;
        }
    };
    let envelope = match decoded {
        Decoded::Envelope(envelope) => envelope,
        Decoded::Unknown { kind } => {
            counters::message_received("unknown");
            debug!(%conn_id, %kind, "ws: unknown envelope ignored");
            return;
        }
    };

    let kind = envelope.kind();
    counters::message_received(kind.as_str());
    match &envelope {
        Envelope::Path(path) => counters::path(path.points.len()),
        Envelope::Draw(_) => counters::draw(),
        Envelope::Clear(_) => counters::clear(),
        _ => {}
    }
    match route(envelope) {
        Outcome::Join(participant) => {
            info!(%conn_id, id = %participant.id, name = %participant.player_name, "ws: participant joined");
            if state.join(conn_id, participant.clone()).await {
                state.broadcast(&envelope::encode(&Envelope::PlayerJoin(participant)), Some(conn_id)).await;
            }
        }
        Outcome::Relay => {
            debug!(%conn_id, %kind, "ws: relay");
            state.broadcast(text, Some(conn_id)).await;
        }
        Outcome::Ignore(reason) => debug!(%conn_id, %kind, reason, "ws: envelope ignored"),
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
