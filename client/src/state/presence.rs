//! Presence registry: the live mapping of other connected participants.
//!
//! DESIGN
//! ======
//! Join and leave pushes from the relay are applied as they arrive. Because a
//! lost `player_leave` would otherwise leave a ghost forever, the session also
//! reconciles the mapping against the HTTP roster on every connect and on a
//! fixed interval.
//!
//! A roster is a snapshot taken when it was requested. Every push bumps a
//! generation counter and stamps the id it touched; reconciliation leaves an
//! id alone when it was pushed after the snapshot was requested, so a slow
//! fetch can neither erase a fresh join nor revive a fresh leave.
//!
//! The local participant is never stored here; self is always online.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::HashMap;

use envelope::{Envelope, Participant};
use tracing::debug;

use crate::net::connection::EnvelopeSink;

/// Effect of one join or leave on the mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenceChange {
    Joined(Participant),
    Left(Participant),
    Unchanged,
}

/// Participants a roster reconciliation added or removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub added: Vec<Participant>,
    pub removed: Vec<Participant>,
}

/// Participants other than self, keyed by id.
#[derive(Clone, Debug)]
pub struct PresenceRegistry {
    self_id: String,
    participants: HashMap<String, Participant>,
    generation: u64,
    pushed: HashMap<String, u64>,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new(self_id: impl Into<String>) -> Self {
        Self { self_id: self_id.into(), participants: HashMap::new(), generation: 0, pushed: HashMap::new() }
    }

    /// Push generation to pass to [`Self::reconcile`] for a roster requested now.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Participants sorted by display name, then id.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        let mut list: Vec<Participant> = self.participants.values().cloned().collect();
        list.sort_by(|a, b| a.player_name.cmp(&b.player_name).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Record a participant. A known id is refreshed in place.
    pub fn apply_join(&mut self, participant: Participant) -> PresenceChange {
        if participant.id == self.self_id {
            return PresenceChange::Unchanged;
        }
        self.stamp(&participant.id);
        match self.participants.insert(participant.id.clone(), participant.clone()) {
            Some(_) => PresenceChange::Unchanged,
            None => PresenceChange::Joined(participant),
        }
    }

    /// Forget a participant. Unknown ids are ignored.
    pub fn apply_leave(&mut self, id: &str) -> PresenceChange {
        if id == self.self_id {
            return PresenceChange::Unchanged;
        }
        self.stamp(id);
        match self.participants.remove(id) {
            Some(participant) => PresenceChange::Left(participant),
            None => PresenceChange::Unchanged,
        }
    }

    /// Replace the mapping with a roster requested at generation `requested_at`.
    ///
    /// Ids pushed after `requested_at` keep their pushed state.
    pub fn reconcile(&mut self, roster: impl IntoIterator<Item = Participant>, requested_at: u64) -> Reconciled {
        let pushed_since = |pushed: &HashMap<String, u64>, id: &str| pushed.get(id).is_some_and(|g| *g > requested_at);

        let mut next: HashMap<String, Participant> = roster
            .into_iter()
            .filter(|p| p.id != self.self_id && !pushed_since(&self.pushed, &p.id))
            .map(|p| (p.id.clone(), p))
            .collect();
        for (id, participant) in &self.participants {
            if pushed_since(&self.pushed, id) {
                next.insert(id.clone(), participant.clone());
            }
        }

        let mut added: Vec<Participant> =
            next.values().filter(|p| !self.participants.contains_key(&p.id)).cloned().collect();
        let mut removed: Vec<Participant> =
            self.participants.values().filter(|p| !next.contains_key(&p.id)).cloned().collect();
        added.sort_by(|a, b| a.player_name.cmp(&b.player_name).then_with(|| a.id.cmp(&b.id)));
        removed.sort_by(|a, b| a.player_name.cmp(&b.player_name).then_with(|| a.id.cmp(&b.id)));

        self.participants = next;
        self.pushed.retain(|_, generation| *generation > requested_at);
        Reconciled { added, removed }
    }

    fn stamp(&mut self, id: &str) {
        self.generation += 1;
        self.pushed.insert(id.to_owned(), self.generation);
    }
}

/// Sends the local `join` once per open link.
///
/// The relay forgets identities with the socket, so every reconnect needs
/// its own announcement. Links are identified by
/// [`ConnectionManager::open_link`](crate::net::connection::ConnectionManager::open_link),
/// so an `Open` event handled after the link it described is gone cannot
/// announce twice on its successor.
#[derive(Clone, Debug)]
pub struct JoinAnnouncer {
    me: Participant,
    announced: Option<u64>,
}

impl JoinAnnouncer {
    #[must_use]
    pub fn new(me: Participant) -> Self {
        Self { me, announced: None }
    }

    /// Feed the link that is open right now, if any. Returns true when a
    /// `join` went out.
    pub fn observe(&mut self, open_link: Option<u64>, sink: &dyn EnvelopeSink) -> bool {
        let Some(link) = open_link else {
            return false;
        };
        if self.announced == Some(link) {
            return false;
        }
        match sink.send(&Envelope::Join(self.me.clone())) {
            Ok(()) => {
                self.announced = Some(link);
                true
            }
            Err(rejected) => {
                debug!(%rejected, link, "presence: join deferred");
                false
            }
        }
    }
}
