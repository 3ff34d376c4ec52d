//! Shared envelope model and JSON codec for the realtime WS transport.
//!
//! This crate owns the wire representation used by both the relay server and
//! the client sync core. Every websocket text frame carries exactly one
//! envelope: `{"type": <kind>, "payload": <shape fixed by kind>}`.
//!
//! DESIGN
//! ======
//! The set of kinds is closed but versionable. Decoding a kind this build does
//! not know yields [`Decoded::Unknown`] rather than an error, so older peers
//! keep working when newer peers start sending new kinds.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Maximum length of a chat message, in characters.
pub const MAX_CHAT_CHARS: usize = 200;

/// Error returned by [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The text is not a JSON envelope object.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// The envelope has no `type` field.
    #[error("envelope is missing `type`")]
    MissingType,
    /// The `type` is known but the payload does not have its shape.
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: EnvelopeKind,
        #[source]
        source: serde_json::Error,
    },
}

/// The closed set of envelope kinds understood by this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// Client announces its identity to the server.
    Join,
    /// Server announces that a participant joined.
    PlayerJoin,
    /// Server announces that a participant left.
    PlayerLeave,
    /// Chat message.
    Message,
    /// Stroke delta: an ordered run of points.
    Path,
    /// Clear the whole surface.
    Clear,
    /// Deprecated single-point draw.
    Draw,
}

impl EnvelopeKind {
    /// All known kinds, in wire-name order.
    pub const ALL: [Self; 7] = [
        Self::Join,
        Self::PlayerJoin,
        Self::PlayerLeave,
        Self::Message,
        Self::Path,
        Self::Clear,
        Self::Draw,
    ];

    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::PlayerJoin => "player_join",
            Self::PlayerLeave => "player_leave",
            Self::Message => "message",
            Self::Path => "path",
            Self::Clear => "clear",
            Self::Draw => "draw",
        }
    }

    /// Parse a wire name. Returns `None` for kinds this build does not know.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 2D point in surface coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Identity of one participant, assigned once at login.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Opaque participant id.
    pub id: String,
    /// Display name.
    pub player_name: String,
    /// Avatar emoji.
    pub player_emoji: String,
}

impl Participant {
    #[must_use]
    pub fn new(id: impl Into<String>, player_name: impl Into<String>, player_emoji: impl Into<String>) -> Self {
        Self { id: id.into(), player_name: player_name.into(), player_emoji: player_emoji.into() }
    }

    /// True when id, name and emoji are all non-blank.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.id, &self.player_name, &self.player_emoji].iter().all(|field| !field.trim().is_empty())
    }
}

/// Payload of a `message` envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Message id, unique per sender session.
    pub id: String,
    pub player_name: String,
    pub player_emoji: String,
    /// Message text, at most [`MAX_CHAT_CHARS`] characters.
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Author participant id. Older senders omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

/// Payload of a `path` envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPayload {
    /// Points in chronological sampling order. One point is a dot.
    pub points: Vec<Point>,
    /// Author participant id.
    pub id: String,
    pub player_name: String,
    pub player_emoji: String,
    /// Hex color, e.g. `#FF6B6B`.
    pub color: String,
    pub stroke_width: f64,
}

/// Payload of the deprecated `draw` envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawPayload {
    pub x: f64,
    pub y: f64,
    /// Author participant id.
    pub id: String,
    #[serde(default)]
    pub player_name: String,
    #[serde(default)]
    pub player_emoji: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
}

/// A single message on the realtime wire protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    Join(Participant),
    PlayerJoin(Participant),
    PlayerLeave(Participant),
    Message(ChatPayload),
    Path(PathPayload),
    Clear(Participant),
    Draw(DrawPayload),
}

impl Envelope {
    /// Kind of this envelope.
    #[must_use]
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Join(_) => EnvelopeKind::Join,
            Self::PlayerJoin(_) => EnvelopeKind::PlayerJoin,
            Self::PlayerLeave(_) => EnvelopeKind::PlayerLeave,
            Self::Message(_) => EnvelopeKind::Message,
            Self::Path(_) => EnvelopeKind::Path,
            Self::Clear(_) => EnvelopeKind::Clear,
            Self::Draw(_) => EnvelopeKind::Draw,
        }
    }

    /// Participant id of the author, when the payload carries one.
    ///
    /// Chat payloads only carry it when the sender filled `playerId`.
    #[must_use]
    pub fn author_id(&self) -> Option<&str> {
        match self {
            Self::Join(p) | Self::PlayerJoin(p) | Self::PlayerLeave(p) | Self::Clear(p) => Some(&p.id),
            Self::Message(m) => m.player_id.as_deref(),
            Self::Path(p) => Some(&p.id),
            Self::Draw(d) => Some(&d.id),
        }
    }
}

/// Result of decoding one wire frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A recognized envelope.
    Envelope(Envelope),
    /// A well-formed envelope of a kind this build does not know.
    Unknown { kind: String },
}

/// Encode an envelope into one JSON text frame.
#[must_use]
pub fn encode(envelope: &Envelope) -> String {
    // Every payload field is a string, number, or list of numbers; serializing
    // into a `String` cannot fail for these shapes.
    serde_json::to_string(envelope).unwrap_or_default()
}

/// Decode one JSON text frame.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] for text that is not a JSON envelope,
/// [`DecodeError::MissingType`] when `type` is absent, and
/// [`DecodeError::Payload`] when a known kind carries a mismatched payload.
pub fn decode(text: &str) -> Result<Decoded, DecodeError> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let Some(kind) = raw.kind else {
        return Err(DecodeError::MissingType);
    };
    let Some(known) = EnvelopeKind::parse(&kind) else {
        return Ok(Decoded::Unknown { kind });
    };

    let envelope = match known {
        EnvelopeKind::Join => Envelope::Join(payload(known, raw.payload)?),
        EnvelopeKind::PlayerJoin => Envelope::PlayerJoin(payload(known, raw.payload)?),
        EnvelopeKind::PlayerLeave => Envelope::PlayerLeave(payload(known, raw.payload)?),
        EnvelopeKind::Message => Envelope::Message(payload(known, raw.payload)?),
        EnvelopeKind::Path => Envelope::Path(payload(known, raw.payload)?),
        EnvelopeKind::Clear => Envelope::Clear(payload(known, raw.payload)?),
        EnvelopeKind::Draw => Envelope::Draw(payload(known, raw.payload)?),
    };
    Ok(Decoded::Envelope(envelope))
}

fn payload<T: DeserializeOwned>(kind: EnvelopeKind, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Payload { kind, source })
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    payload: Value,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
