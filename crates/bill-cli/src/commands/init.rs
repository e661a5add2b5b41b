//! Init command: writes a configuration template for a user.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::user_config_path;

/// Runs the init command.
///
/// Writes to `config_path` when given, otherwise to the user's default
/// configuration file. An existing file is never overwritten.
pub fn run(username: &str, config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => user_config_path(username)?,
    };
    let timezone = detect_timezone();
    write_template(&path, username, &timezone)?;

    println!("Created:  {}", path.display());
    println!("Timezone: {timezone}");
    println!("Fill in feed.url and feed.password before running `bill invoice`.");
    Ok(())
}

fn detect_timezone() -> String {
    match iana_time_zone::get_timezone() {
        Ok(tz) => tz,
        Err(err) => {
            tracing::warn!(%err, "could not detect system timezone, defaulting to UTC");
            "UTC".to_string()
        }
    }
}

fn write_template(path: &Path, username: &str, timezone: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            bail!("{} already exists, not overwriting", path.display());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to create {}", path.display()));
        }
    };
    file.write_all(template(username, timezone).as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn template(username: &str, timezone: &str) -> String {
    let output_dir = dirs::document_dir()
        .or_else(dirs::home_dir)
        .map_or_else(|| PathBuf::from("invoices"), |dir| dir.join("invoices"));
    format!(
        r#"# bill configuration for {username}
#
# Values can be overridden with BILL_* environment variables,
# e.g. BILL_FEED__PASSWORD.

timezone = "{timezone}"
output_dir = '{output_dir}'

[feed]
url = ""
# username = "{username}"
password = ""
# timeout_secs = 30

[invoice]
# logo = "ACME CONSULTING"
header = []

# [dispatch]
# kind = "outbox"
# dir = '{outbox}'
# sender = "billing@example.com"
# recipient = "accounting@example.com"
"#,
        output_dir = output_dir.display(),
        outbox = output_dir.join("outbox").display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::RawUserConfig;

    #[test]
    fn template_is_valid_toml_with_blank_secrets() {
        let raw: RawUserConfig = toml_from(&template("alice", "Europe/Vienna"));
        assert_eq!(raw.timezone.as_deref(), Some("Europe/Vienna"));
        assert!(raw.output_dir.is_some());
        assert!(raw.dispatch.is_none());
        assert_eq!(raw.feed.url.as_deref(), Some(""));
    }

    #[test]
    fn template_fails_validation_until_filled_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.toml");
        write_template(&path, "alice", "Europe/Vienna").unwrap();

        let raw: RawUserConfig = toml_from(&std::fs::read_to_string(&path).unwrap());
        let err = raw.validate("alice", &path).unwrap_err().to_string();
        assert!(err.contains("feed.url is required"), "{err}");
        assert!(err.contains("feed.password is required"), "{err}");
        assert!(!err.contains("timezone"), "{err}");
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users").join("alice.toml");
        write_template(&path, "alice", "UTC").unwrap();
        std::fs::write(&path, "timezone = \"Asia/Tokyo\"\n").unwrap();

        let err = write_template(&path, "alice", "UTC").unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timezone = \"Asia/Tokyo\"\n"
        );
    }

    fn toml_from(content: &str) -> RawUserConfig {
        use figment::Figment;
        use figment::providers::{Format, Toml};
        Figment::from(Toml::string(content)).extract().unwrap()
    }
}
