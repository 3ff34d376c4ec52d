//! Chat history and the unsent draft.
//!
//! History is append-only: entries are never edited, removed or reordered.

#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

use envelope::{ChatPayload, MAX_CHAT_CHARS, Participant};
use time::OffsetDateTime;

use crate::net::connection::SendRejected;

/// Why an outgoing chat message was not sent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    Empty,
    #[error("message is {len} characters, limit is {MAX_CHAT_CHARS}")]
    TooLong { len: usize },
    #[error("message not sent: {0}")]
    Rejected(#[from] SendRejected),
}

/// One received or sent chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEntry {
    pub id: String,
    /// Author participant id, when the sender supplied one.
    pub author_id: Option<String>,
    pub author_name: String,
    pub author_emoji: String,
    pub text: String,
    pub timestamp: OffsetDateTime,
}

impl From<ChatPayload> for ChatEntry {
    fn from(chat: ChatPayload) -> Self {
        let text = if chat.message.chars().count() > MAX_CHAT_CHARS {
            chat.message.chars().take(MAX_CHAT_CHARS).collect()
        } else {
            chat.message
        };
        Self {
            id: chat.id,
            author_id: chat.player_id,
            author_name: chat.player_name,
            author_emoji: chat.player_emoji,
            text,
            timestamp: chat.timestamp,
        }
    }
}

/// Ordered chat history.
#[derive(Clone, Debug, Default)]
pub struct ChatHistory {
    entries: Vec<ChatEntry>,
}

impl ChatHistory {
    pub fn push(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Text typed but not yet sent. Survives a rejected send.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatDraft {
    text: String,
}

impl ChatDraft {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Trimmed draft text, if it is sendable.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Empty`] for blank drafts and
    /// [`ChatError::TooLong`] past [`MAX_CHAT_CHARS`] characters.
    pub fn validated(&self) -> Result<&str, ChatError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(ChatError::Empty);
        }
        let len = text.chars().count();
        if len > MAX_CHAT_CHARS {
            return Err(ChatError::TooLong { len });
        }
        Ok(text)
    }
}

/// Build the outgoing payload for `text` from `me`, with a fresh id.
#[must_use]
pub fn compose(me: &Participant, text: &str, timestamp: OffsetDateTime) -> ChatPayload {
    ChatPayload {
        id: uuid::Uuid::new_v4().to_string(),
        player_name: me.player_name.clone(),
        player_emoji: me.player_emoji.clone(),
        message: text.to_owned(),
        timestamp,
        player_id: Some(me.id.clone()),
    }
}
