//! User-facing notifications raised by the session.

use std::time::Duration;

use envelope::Participant;

/// A one-shot (or, for [`Notice::ReconnectExhausted`], persistent)
/// notification for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A participant appeared in the presence mapping.
    PlayerJoined(Participant),
    /// A participant left the presence mapping.
    PlayerLeft(Participant),
    /// The connection reached `Open`.
    Connected,
    /// The connection dropped; another attempt follows after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect attempts ran out. Stays until the user reconnects.
    ReconnectExhausted,
}

impl Notice {
    /// True for notices that should stay visible until dismissed.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::ReconnectExhausted)
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlayerJoined(p) => write!(f, "{} {} joined", p.player_emoji, p.player_name),
            Self::PlayerLeft(p) => write!(f, "{} {} left", p.player_emoji, p.player_name),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt, delay } => {
                write!(f, "connection lost, retry {attempt} in {}ms", delay.as_millis())
            }
            Self::ReconnectExhausted => f.write_str("could not reconnect; reconnect manually"),
        }
    }
}
