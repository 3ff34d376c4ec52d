//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the hub: every live connection's outbox plus, once the connection
//! has sent `join`, the participant it speaks for. Fan-out is best effort:
//! a full outbox drops the frame for that peer, a closed one is pruned.
//!
//! Connection and player gauges move only here, on insert and on removal,
//! so they stay balanced whichever path removes a peer.

use std::collections::HashMap;
use std::sync::Arc;

use envelope::Participant;
use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::telemetry::{counters, gauges};

/// Per-connection outbox depth.
pub const OUTBOX_CAPACITY: usize = 256;

// =============================================================================
// PEER
// =============================================================================

/// One live websocket connection.
pub struct Peer {
    /// Sender for outgoing text frames.
    pub tx: mpsc::Sender<String>,
    /// Identity announced by `join`, if any.
    pub participant: Option<Participant>,
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state. Clone is required by Axum.
#[derive(Clone, Default)]
pub struct AppState {
    pub peers: Arc<RwLock<HashMap<Uuid, Peer>>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with no identity yet.
    pub async fn register(&self, conn_id: Uuid, tx: mpsc::Sender<String>) {
        let replaced = self.peers.write().await.insert(conn_id, Peer { tx, participant: None });
        gauges::connection_opened();
        if let Some(peer) = replaced {
            forget(&peer);
        }
    }

    /// Record the identity a connection speaks for. Returns false for
    /// unknown connections and incomplete identities.
    pub async fn join(&self, conn_id: Uuid, participant: Participant) -> bool {
        if !participant.is_complete() {
            return false;
        }
        let mut peers = self.peers.write().await;
        let Some(peer) = peers.get_mut(&conn_id) else {
            return false;
        };
        if peer.participant.replace(participant).is_none() {
            gauges::player_joined();
        }
        true
    }

    /// Remove a connection. Returns the participant it spoke for when no
    /// other live connection still speaks for the same id.
    pub async fn unregister(&self, conn_id: Uuid) -> Option<Participant> {
        let mut peers = self.peers.write().await;
        let peer = peers.remove(&conn_id)?;
        forget(&peer);
        let participant = peer.participant?;
        let still_present = peers
            .values()
            .any(|peer| peer.participant.as_ref().is_some_and(|p| p.id == participant.id));
        if still_present {
            debug!(id = %participant.id, "hub: participant still connected elsewhere");
            return None;
        }
        Some(participant)
    }

    /// Joined participants, one per id, sorted by name.
    pub async fn roster(&self) -> Vec<Participant> {
        let peers = self.peers.read().await;
        let mut by_id: HashMap<&str, &Participant> = HashMap::new();
        for participant in peers.values().filter_map(|peer| peer.participant.as_ref()) {
            by_id.insert(participant.id.as_str(), participant);
        }
        let mut roster: Vec<Participant> = by_id.into_values().cloned().collect();
        roster.sort_by(|a, b| a.player_name.cmp(&b.player_name).then_with(|| a.id.cmp(&b.id)));
        roster
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Send `text` to every connection except `exclude`.
    pub async fn broadcast(&self, text: &str, exclude: Option<Uuid>) {
        let mut dead = Vec::new();
        {
            let peers = self.peers.read().await;
            for (conn_id, peer) in peers.iter() {
                if exclude == Some(*conn_id) {
                    continue;
                }
                match peer.tx.try_send(text.to_owned()) {
                    Ok(()) => counters::message_sent(),
                    Err(TrySendError::Full(_)) => warn!(%conn_id, "hub: outbox full, frame dropped"),
                    Err(TrySendError::Closed(_)) => dead.push(*conn_id),
                }
            }
        }

        if !dead.is_empty() {
            let mut peers = self.peers.write().await;
            for conn_id in dead {
                if let Some(peer) = peers.remove(&conn_id) {
                    debug!(%conn_id, "hub: pruning closed peer");
                    forget(&peer);
                }
            }
        }
    }
}

/// Release the gauges a removed peer held.
fn forget(peer: &Peer) {
    gauges::connection_closed();
    if peer.participant.is_some() {
        gauges::player_left();
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
