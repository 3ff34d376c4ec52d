//! # client
//!
//! Headless sync core for the shared drawing surface and chat stream.
//!
//! The crate keeps many high-frequency local events (pointer motion) and
//! low-frequency events (chat, presence) consistent across one unreliable
//! websocket connection. Pixels and chat widgets live outside; this crate
//! talks to them through the [`render::Renderer`] seam and plain state.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`net`] | Connection manager, reconnect backoff, transport seam, inbound dispatch, roster HTTP |
//! | [`draw`] | Stroke transmitter: gesture buffer and trailing throttle |
//! | [`state`] | Presence registry and chat history |
//! | [`render`] | Rendering collaborator trait and stroke segments |
//! | [`notice`] | User-facing notifications |
//! | [`config`] | Environment configuration and endpoint derivation |
//! | [`session`] | Session context tying the pieces together |

pub mod config;
pub mod draw;
pub mod net;
pub mod notice;
pub mod render;
pub mod session;
pub mod state;

pub use envelope;
