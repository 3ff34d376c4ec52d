//! Inbound dispatcher: decoded envelopes into local state.
//!
//! Every inbound frame is decoded once and routed by kind. Frames that fail
//! to decode are logged and dropped before anything is touched.

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_test;

use envelope::{DecodeError, Decoded, Envelope};
use tracing::{debug, warn};

use crate::notice::Notice;
use crate::render::{Renderer, StrokeSegment};
use crate::state::SessionStore;
use crate::state::chat::ChatEntry;
use crate::state::presence::PresenceChange;

/// Routes inbound frames for one local participant.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    self_id: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(self_id: impl Into<String>) -> Self {
        Self { self_id: self_id.into() }
    }

    /// Decode and apply one text frame.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeError`] for malformed frames; nothing was applied.
    pub fn dispatch_text(
        &self,
        text: &str,
        store: &mut SessionStore,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<Notice>, DecodeError> {
        match envelope::decode(text)? {
            Decoded::Envelope(envelope) => Ok(self.dispatch(envelope, store, renderer)),
            Decoded::Unknown { kind } => {
                debug!(%kind, "dispatch: unknown envelope ignored");
                Ok(None)
            }
        }
    }

    /// Like [`Self::dispatch_text`], logging and dropping malformed frames.
    pub fn dispatch_frame(&self, text: &str, store: &mut SessionStore, renderer: &mut dyn Renderer) -> Option<Notice> {
        match self.dispatch_text(text, store, renderer) {
            Ok(notice) => notice,
            Err(error) => {
                warn!(%error, len = text.len(), "dispatch: malformed frame dropped");
                None
            }
        }
    }

    /// Apply one decoded envelope.
    pub fn dispatch(&self, envelope: Envelope, store: &mut SessionStore, renderer: &mut dyn Renderer) -> Option<Notice> {
        if self.is_echo(&envelope) {
            debug!(kind = %envelope.kind(), "dispatch: own echo skipped");
            return None;
        }

        match envelope {
            Envelope::Join(_) => {
                debug!("dispatch: inbound join ignored");
                None
            }
            Envelope::PlayerJoin(participant) => match store.presence.apply_join(participant) {
                PresenceChange::Joined(p) => Some(Notice::PlayerJoined(p)),
                _ => None,
            },
            Envelope::PlayerLeave(participant) => match store.presence.apply_leave(&participant.id) {
                PresenceChange::Left(p) => Some(Notice::PlayerLeft(p)),
                _ => None,
            },
            Envelope::Message(chat) => {
                store.chat.push(ChatEntry::from(chat));
                None
            }
            Envelope::Path(path) => {
                renderer.draw_segment(&StrokeSegment::from(path));
                None
            }
            Envelope::Draw(draw) => {
                renderer.draw_segment(&StrokeSegment::from(draw));
                None
            }
            Envelope::Clear(_) => {
                renderer.clear_surface();
                None
            }
        }
    }

    fn is_echo(&self, envelope: &Envelope) -> bool {
        match envelope {
            Envelope::Message(_) | Envelope::Path(_) | Envelope::Draw(_) | Envelope::Clear(_) => {
                envelope.author_id() == Some(self.self_id.as_str())
            }
            Envelope::Join(_) | Envelope::PlayerJoin(_) | Envelope::PlayerLeave(_) => false,
        }
    }
}
