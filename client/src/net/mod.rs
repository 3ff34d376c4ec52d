//! Networking modules for the realtime connection and roster HTTP.
//!
//! SYSTEM CONTEXT
//! ==============
//! `connection` owns the websocket lifecycle on top of the `transport` seam,
//! `backoff` sizes reconnect delays, `dispatch` routes decoded inbound
//! envelopes into local state, and `api` fetches the participant roster.

pub mod api;
pub mod backoff;
pub mod connection;
pub mod dispatch;
pub mod transport;

#[cfg(test)]
#[path = "fake_test.rs"]
pub(crate) mod fake;
