//! Calendar feed download.
//!
//! Fetches the raw bytes of a remote iCalendar feed with HTTP basic
//! authentication. Failures are surfaced as [`FetchError`]; nothing is retried.

use std::fmt;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use thiserror::Error;

/// Longest response body excerpt kept in a [`FetchError::Status`].
const BODY_EXCERPT_LEN: usize = 200;

/// Feed download errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed URL could not be parsed or uses an unsupported scheme.
    #[error("invalid feed URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// The server did not answer within the timeout.
    #[error("feed request timed out after {0:?}")]
    Timeout(Duration),
    /// The server rejected the credentials.
    #[error("feed server rejected the credentials ({status})")]
    Unauthorized { status: StatusCode },
    /// The server answered with another non-success status.
    #[error("feed server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    /// HTTP request failed.
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Basic-auth credentials for the feed server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Calendar feed HTTP client.
///
/// Every request is bounded by the timeout given at construction.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl FeedClient {
    /// Creates a new client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { http, timeout })
    }

    /// Downloads the feed at `url`.
    pub async fn fetch(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>, FetchError> {
        let url = normalize_url(url)?;
        tracing::debug!(%url, user = %credentials.username, "fetching calendar feed");

        let response = self
            .http
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(|err| self.classify_error(err))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(FetchError::Unauthorized { status });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status,
                body: excerpt(&body),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.classify_error(err))?;
        tracing::debug!(bytes = bytes.len(), "downloaded calendar feed");
        Ok(bytes.to_vec())
    }

    fn classify_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Request(err)
        }
    }
}

/// Parses the feed URL, rewriting `webcal://` to `https://`.
fn normalize_url(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    let rewritten = raw
        .strip_prefix("webcal://")
        .map_or_else(|| raw.to_string(), |rest| format!("https://{rest}"));
    let url = Url::parse(&rewritten).map_err(|err| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
