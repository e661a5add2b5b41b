//! Per-user configuration loading and validation.
//!
//! Each user has one TOML file, by default
//! `<config dir>/bill/users/<username>.toml`. Environment variables prefixed
//! with `BILL_` override file values; nested keys are separated by `__`
//! (e.g. `BILL_FEED__PASSWORD`).
//!
//! The file is read into [`RawUserConfig`], where every field is optional, and
//! then validated into a fully typed [`UserConfig`] before anything touches
//! the network.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bill_core::Tz;
use bill_feed::Credentials;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request timeout used when `feed.timeout_secs` is not set.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration errors. All of them abort the run before any fetch.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The username cannot name a configuration file.
    #[error("invalid username {0:?}")]
    InvalidUsername(String),

    /// No platform configuration directory is available.
    #[error("could not determine configuration directory")]
    NoConfigDir,

    /// The user's configuration file does not exist.
    #[error("configuration file {} not found (run 'bill init <username>' to create one)", .0.display())]
    NotFound(PathBuf),

    /// The file or environment could not be read.
    #[error("failed to read configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Required values are missing or malformed.
    #[error("invalid configuration in {}:\n  - {}", path.display(), problems.join("\n  - "))]
    Invalid {
        path: PathBuf,
        problems: Vec<String>,
    },
}

/// Configuration as written in the file; every field is optional here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawUserConfig {
    #[serde(default)]
    pub feed: RawFeed,
    pub timezone: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub dispatch: Option<RawDispatch>,
    #[serde(default)]
    pub invoice: InvoiceHeader,
}

/// `[feed]` section.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RawFeed {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for RawFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFeed")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// `[dispatch]` section.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RawDispatch {
    pub kind: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    /// Outbox directory.
    pub dir: Option<PathBuf>,
    /// Webhook endpoint.
    pub url: Option<String>,
    /// Optional bearer token for the webhook.
    pub token: Option<String>,
}

impl fmt::Debug for RawDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDispatch")
            .field("kind", &self.kind)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("dir", &self.dir)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// `[invoice]` section: free-form lines printed at the top of every document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    /// Banner line above the title.
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub header: Vec<String>,
}

/// Validated configuration for one user.
#[derive(Debug, Clone)]
pub struct UserConfig {
    pub username: String,
    pub feed: FeedConfig,
    pub timezone: Tz,
    pub output_dir: PathBuf,
    /// `None` when documents are only rendered.
    pub dispatch: Option<DispatchConfig>,
    pub invoice: InvoiceHeader,
}

/// Where and how to fetch the calendar.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub credentials: Credentials,
    pub timeout: Duration,
}

/// How rendered invoices are delivered.
#[derive(Clone, PartialEq, Eq)]
pub enum DispatchConfig {
    /// Write messages into a spool directory for an external mailer.
    Outbox {
        dir: PathBuf,
        sender: String,
        recipient: String,
    },
    /// POST messages as JSON to an HTTP endpoint.
    Webhook {
        url: String,
        token: Option<String>,
        sender: String,
        recipient: String,
    },
}

impl DispatchConfig {
    pub fn sender(&self) -> &str {
        match self {
            Self::Outbox { sender, .. } | Self::Webhook { sender, .. } => sender,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Outbox { recipient, .. } | Self::Webhook { recipient, .. } => recipient,
        }
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbox {
                dir,
                sender,
                recipient,
            } => f
                .debug_struct("Outbox")
                .field("dir", dir)
                .field("sender", sender)
                .field("recipient", recipient)
                .finish(),
            Self::Webhook {
                url,
                token,
                sender,
                recipient,
            } => f
                .debug_struct("Webhook")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "[REDACTED]"))
                .field("sender", sender)
                .field("recipient", recipient)
                .finish(),
        }
    }
}

impl UserConfig {
    /// Loads and validates the configuration for `username`.
    ///
    /// `config_path` replaces the default per-user file location.
    pub fn load(username: &str, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => user_config_path(username)?,
        };
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }

        let raw: RawUserConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BILL_").split("__"))
            .extract()
            .map_err(Box::new)?;

        raw.validate(username, &path)
    }
}

impl RawUserConfig {
    /// Checks every field, reporting all problems at once.
    pub fn validate(self, username: &str, path: &Path) -> Result<UserConfig, ConfigError> {
        let mut problems = Vec::new();

        let url = required(self.feed.url, "feed.url", &mut problems);
        let password = required(self.feed.password, "feed.password", &mut problems);
        let feed_user = non_empty(self.feed.username).unwrap_or_else(|| username.to_string());
        let timeout = match self.feed.timeout_secs {
            Some(0) => {
                problems.push("feed.timeout_secs must be greater than zero".to_string());
                DEFAULT_FETCH_TIMEOUT
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_FETCH_TIMEOUT,
        };

        let timezone = required(self.timezone, "timezone", &mut problems).and_then(|name| {
            name.parse::<Tz>()
                .map_err(|_| problems.push(format!("timezone {name:?} is not an IANA time zone")))
                .ok()
        });

        let output_dir = self.output_dir.filter(|p| !p.as_os_str().is_empty());
        if output_dir.is_none() {
            problems.push("output_dir is required".to_string());
        }

        let dispatch = self
            .dispatch
            .and_then(|raw| validate_dispatch(raw, &mut problems));

        match (url, password, timezone, output_dir) {
            (Some(url), Some(password), Some(timezone), Some(output_dir)) if problems.is_empty() => {
                Ok(UserConfig {
                    username: username.to_string(),
                    feed: FeedConfig {
                        url,
                        credentials: Credentials::new(feed_user, password),
                        timeout,
                    },
                    timezone,
                    output_dir,
                    dispatch,
                    invoice: self.invoice,
                })
            }
            _ => Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                problems,
            }),
        }
    }
}

fn validate_dispatch(raw: RawDispatch, problems: &mut Vec<String>) -> Option<DispatchConfig> {
    let sender = required(raw.sender, "dispatch.sender", problems);
    let recipient = required(raw.recipient, "dispatch.recipient", problems);
    let kind = required(raw.kind, "dispatch.kind", problems)?;

    match kind.as_str() {
        "outbox" => {
            let dir = raw.dir.filter(|p| !p.as_os_str().is_empty());
            if dir.is_none() {
                problems.push("dispatch.dir is required for the outbox dispatcher".to_string());
            }
            Some(DispatchConfig::Outbox {
                dir: dir?,
                sender: sender?,
                recipient: recipient?,
            })
        }
        "webhook" => {
            let url = required(raw.url, "dispatch.url", problems);
            Some(DispatchConfig::Webhook {
                url: url?,
                token: non_empty(raw.token),
                sender: sender?,
                recipient: recipient?,
            })
        }
        other => {
            problems.push(format!(
                "dispatch.kind {other:?} is not supported (expected \"outbox\" or \"webhook\")"
            ));
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &str, problems: &mut Vec<String>) -> Option<String> {
    let value = non_empty(value);
    if value.is_none() {
        problems.push(format!("{field} is required"));
    }
    value
}

/// Returns the default configuration file for `username`.
pub fn user_config_path(username: &str) -> Result<PathBuf, ConfigError> {
    validate_username(username)?;
    let dir = dirs_config_path().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join("users").join(format!("{username}.toml")))
}

/// Usernames become file names, so they must not contain path syntax.
fn validate_username(username: &str) -> Result<(), ConfigError> {
    let valid = !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !username.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidUsername(username.to_string()))
    }
}

/// Returns the platform-specific config directory for bill.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bill"))
}
