//! Roster HTTP client.
//!
//! Thin wrapper over `GET /players`. Parsing lives in [`parse_roster`] so it
//! can be tested without a server.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use envelope::Participant;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Roster fetch failures.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
    #[error("roster request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("roster request failed: {status}")]
    Status { status: u16 },
    #[error("roster body is not a participant list: {0}")]
    Body(#[from] serde_json::Error),
}

/// Anything that can list the participants the server knows about.
#[async_trait::async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Participant>, RosterError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct RosterClient {
    http: reqwest::Client,
    url: String,
}

impl RosterClient {
    /// Build a client for the roster at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::HttpClientBuild`] if the HTTP client cannot be
    /// constructed.
    pub fn new(url: impl Into<String>) -> Result<Self, RosterError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| RosterError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, url: url.into() })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl RosterSource for RosterClient {
    async fn fetch(&self) -> Result<Vec<Participant>, RosterError> {
        let response = self.http.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RosterError::Status { status: status.as_u16() });
        }
        let text = response.text().await?;
        parse_roster(&text)
    }
}

/// Parse a roster body. `null` is an empty roster.
///
/// # Errors
///
/// Returns [`RosterError::Body`] when the body is not a participant list.
pub fn parse_roster(body: &str) -> Result<Vec<Participant>, RosterError> {
    let roster: Option<Vec<Participant>> = serde_json::from_str(body)?;
    Ok(roster.unwrap_or_default())
}
