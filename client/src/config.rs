//! Client configuration from the environment.
//!
//! Every knob has a default, so an empty environment yields a working
//! client against a local relay.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::draw::throttle::DEFAULT_WINDOW;
use crate::net::backoff::ReconnectPolicy;

/// Relay origin used when `POLYDRAW_SERVER_URL` is unset.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
/// Websocket path on the relay.
pub const WS_PATH: &str = "/ws";
/// Roster path on the relay.
pub const ROSTER_PATH: &str = "/players";

const DEFAULT_ROSTER_REFRESH_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("server url {0:?} must start with http://, https://, ws:// or wss://")]
    Scheme(String),
    #[error("server url {0:?} has no host")]
    MissingHost(String),
}

/// Websocket and roster URLs derived from one relay origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    ws_url: String,
    roster_url: String,
}

impl Endpoint {
    /// Derive both URLs from `origin`. The websocket scheme mirrors the page
    /// scheme: `wss` for `https`, `ws` for `http`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown schemes or a missing host.
    pub fn parse(origin: &str) -> Result<Self, ConfigError> {
        let origin = origin.trim();
        let (ws_scheme, http_scheme, rest) = if let Some(rest) = origin.strip_prefix("https://") {
            ("wss", "https", rest)
        } else if let Some(rest) = origin.strip_prefix("http://") {
            ("ws", "http", rest)
        } else if let Some(rest) = origin.strip_prefix("wss://") {
            ("wss", "https", rest)
        } else if let Some(rest) = origin.strip_prefix("ws://") {
            ("ws", "http", rest)
        } else {
            return Err(ConfigError::Scheme(origin.to_owned()));
        };

        let rest = rest.trim_end_matches('/');
        let rest = rest.strip_suffix(WS_PATH).unwrap_or(rest);
        if rest.is_empty() || rest.starts_with('/') {
            return Err(ConfigError::MissingHost(origin.to_owned()));
        }

        Ok(Self {
            ws_url: format!("{ws_scheme}://{rest}{WS_PATH}"),
            roster_url: format!("{http_scheme}://{rest}{ROSTER_PATH}"),
        })
    }

    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    #[must_use]
    pub fn roster_url(&self) -> &str {
        &self.roster_url
    }
}

/// Runtime settings for one [`crate::session::Session`].
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    /// Stroke flush window.
    pub throttle: Duration,
    pub reconnect: ReconnectPolicy,
    /// Roster reconciliation interval. `None` disables the periodic fetch.
    pub roster_refresh: Option<Duration>,
    /// Send trailing points when a gesture ends.
    pub flush_on_release: bool,
}

impl ClientConfig {
    /// Defaults for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            throttle: DEFAULT_WINDOW,
            reconnect: ReconnectPolicy::default(),
            roster_refresh: Some(Duration::from_secs(DEFAULT_ROSTER_REFRESH_SECS)),
            flush_on_release: false,
        }
    }

    /// Read settings from `POLYDRAW_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `POLYDRAW_SERVER_URL` is not a usable
    /// origin. Unparsable numeric values fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let origin = std::env::var("POLYDRAW_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_owned());
        Self::from_env_with_origin(&origin)
    }

    /// Like [`Self::from_env`] with an explicit origin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `origin` is not a usable origin.
    pub fn from_env_with_origin(origin: &str) -> Result<Self, ConfigError> {
        let throttle_ms = env_parse("POLYDRAW_THROTTLE_MS", duration_millis(DEFAULT_WINDOW));
        let base_ms = env_parse("POLYDRAW_RECONNECT_BASE_MS", duration_millis(ReconnectPolicy::DEFAULT_BASE_DELAY));
        let max_attempts = env_parse("POLYDRAW_RECONNECT_MAX_ATTEMPTS", ReconnectPolicy::DEFAULT_MAX_ATTEMPTS);
        let refresh_secs = env_parse("POLYDRAW_ROSTER_REFRESH_SECS", DEFAULT_ROSTER_REFRESH_SECS);
        let flush_on_release = env_parse("POLYDRAW_FLUSH_ON_RELEASE", false);

        Ok(Self {
            endpoint: Endpoint::parse(origin)?,
            throttle: Duration::from_millis(throttle_ms.max(1)),
            reconnect: ReconnectPolicy::new(Duration::from_millis(base_ms), max_attempts),
            roster_refresh: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
            flush_on_release,
        })
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(value) => value.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
