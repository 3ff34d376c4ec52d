//! Local projection of the shared session.
//!
//! SYSTEM CONTEXT
//! ==============
//! `presence` tracks who else is connected, `chat` keeps the ordered message
//! history. Both are mutated only by the inbound dispatcher and the session
//! API, through one [`SessionStore`].

pub mod chat;
pub mod presence;

use chat::ChatHistory;
use presence::PresenceRegistry;

/// Everything the dispatcher may mutate.
#[derive(Clone, Debug)]
pub struct SessionStore {
    pub presence: PresenceRegistry,
    pub chat: ChatHistory,
}

impl SessionStore {
    #[must_use]
    pub fn new(self_id: impl Into<String>) -> Self {
        Self { presence: PresenceRegistry::new(self_id), chat: ChatHistory::default() }
    }
}
