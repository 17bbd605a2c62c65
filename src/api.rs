//! HTTP side channel to the identity and persistence services.
//!
//! Everything here is request/response glue, deliberately separate from the
//! session protocol: gameplay never waits on it and never fails because of
//! it. [`ApiClient`] covers credential issuance (`/auth/login`,
//! `/auth/register`) and the per-account stats aggregate (`/game/stats`),
//! and implements [`StatsSink`] so a logged-in client can be handed
//! straight to [`StatsReporter`](crate::stats::StatsReporter).
//!
//! Only available with the `stats-http` feature (enabled by default).

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrilineError};
use crate::stats::{StatsSink, StatsTally};

// ── Wire types ──────────────────────────────────────────────────────

/// Account identity returned alongside a credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerProfile {
    pub name: String,
    pub username: String,
}

/// Response to a successful login or registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Opaque bearer credential for subsequent stats calls.
    pub token: String,
    #[serde(flatten)]
    pub profile: PlayerProfile,
}

/// Aggregate tallies for one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub name: String,
    pub username: String,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    username: &'a str,
    password: &'a str,
}

// ── Client ──────────────────────────────────────────────────────────

/// Client for the HTTP side channel.
///
/// The credential is fixed at construction: log in with an unauthenticated
/// client, then build an authenticated one from the returned token.
///
/// ```rust,no_run
/// # async fn example() -> Result<(), triline_client::TrilineError> {
/// use triline_client::api::ApiClient;
///
/// let api = ApiClient::new("http://localhost:5000/api");
/// let auth = api.login("alice", "hunter2").await?;
/// let api = api.with_credential(auth.token);
/// let summary = api.fetch_stats().await?;
/// println!("{} wins", summary.wins);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credential: Option<String>,
}

impl ApiClient {
    /// Create an unauthenticated client for the service at `base_url`
    /// (e.g. `http://localhost:5000/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            credential: None,
        }
    }

    /// Attach a bearer credential for stats calls.
    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Returns `true` if a credential is held.
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn credential(&self) -> Result<&str> {
        self.credential
            .as_deref()
            .ok_or(TrilineError::Unauthenticated)
    }

    /// Exchange username/password for a credential.
    ///
    /// # Errors
    ///
    /// [`TrilineError::Unauthenticated`] on rejected credentials,
    /// [`TrilineError::Http`] on any other HTTP failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let resp = self
            .http
            .post(self.url("auth/login"))
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        Self::auth_response(resp).await
    }

    /// Create an account and receive a credential in one step.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn register(&self, name: &str, username: &str, password: &str) -> Result<AuthResponse> {
        let resp = self
            .http
            .post(self.url("auth/register"))
            .json(&RegisterRequest {
                name,
                username,
                password,
            })
            .send()
            .await?;
        Self::auth_response(resp).await
    }

    async fn auth_response(resp: reqwest::Response) -> Result<AuthResponse> {
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(TrilineError::Unauthenticated);
        }
        Ok(resp.error_for_status()?.json::<AuthResponse>().await?)
    }

    /// Fetch the aggregate tallies for the logged-in account.
    ///
    /// # Errors
    ///
    /// [`TrilineError::Unauthenticated`] without a credential (checked
    /// before any request is made) or when the service rejects it.
    pub async fn fetch_stats(&self) -> Result<StatsSummary> {
        let credential = self.credential()?;
        let resp = self
            .http
            .get(self.url("game/stats"))
            .bearer_auth(credential)
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(TrilineError::Unauthenticated);
        }
        Ok(resp.error_for_status()?.json::<StatsSummary>().await?)
    }

    /// Submit a single-game tally increment for the logged-in account.
    ///
    /// # Errors
    ///
    /// Same conditions as [`fetch_stats`](Self::fetch_stats).
    pub async fn update_stats(&self, tally: &StatsTally) -> Result<()> {
        let credential = self.credential()?;
        let resp = self
            .http
            .put(self.url("game/stats"))
            .bearer_auth(credential)
            .json(tally)
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(TrilineError::Unauthenticated);
        }
        resp.error_for_status()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StatsSink for ApiClient {
    /// Fire-and-forget semantics: without a credential the submission
    /// silently no-ops rather than erroring, per the side-channel contract.
    async fn submit(&self, tally: StatsTally) -> Result<()> {
        if self.credential.is_none() {
            debug!("no credential held, skipping stats submission");
            return Ok(());
        }
        self.update_stats(&tally).await
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_flattens_profile() {
        let json = r#"{"token":"tok-1","name":"Alice","username":"alice"}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.token, "tok-1");
        assert_eq!(resp.profile.name, "Alice");
        assert_eq!(resp.profile.username, "alice");
    }

    #[test]
    fn stats_summary_uses_camel_case() {
        let json = r#"{"name":"Alice","username":"alice","gamesPlayed":10,"wins":6,"losses":3,"draws":1}"#;
        let summary: StatsSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.games_played, 10);
        assert_eq!(summary.wins, 6);
    }

    #[test]
    fn url_joining_tolerates_trailing_slash() {
        let api = ApiClient::new("http://localhost:5000/api/");
        assert_eq!(api.url("game/stats"), "http://localhost:5000/api/game/stats");
    }

    #[tokio::test]
    async fn fetch_stats_without_credential_fails_fast() {
        // No server is running; the call must fail before any request.
        let api = ApiClient::new("http://localhost:1");
        let err = api.fetch_stats().await.unwrap_err();
        assert!(matches!(err, TrilineError::Unauthenticated));
    }

    #[tokio::test]
    async fn update_stats_without_credential_fails_fast() {
        let api = ApiClient::new("http://localhost:1");
        let err = api.update_stats(&StatsTally::default()).await.unwrap_err();
        assert!(matches!(err, TrilineError::Unauthenticated));
    }

    #[tokio::test]
    async fn sink_submit_without_credential_is_silent() {
        let api = ApiClient::new("http://localhost:1");
        assert!(api.submit(StatsTally::default()).await.is_ok());
    }
}
