//! Invoice delivery.
//!
//! A [`Dispatcher`] hands one [`Message`] with its attached invoice document
//! to the outside world. Two transports exist: a spool directory of
//! RFC 5322 message files for an external mailer, and a JSON webhook.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bill_core::InvoiceDataset;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DispatchConfig;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery errors for a single customer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write message to {}: {source}", path.display())]
    Spool {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// One outgoing invoice message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub recipient: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub attachment_path: PathBuf,
}

impl Message {
    fn attachment_name(&self) -> String {
        self.attachment_path
            .file_name()
            .map_or_else(|| "invoice".to_string(), |name| name.to_string_lossy().into_owned())
    }

    async fn read_attachment(&self) -> Result<String, DispatchError> {
        tokio::fs::read_to_string(&self.attachment_path)
            .await
            .map_err(|source| DispatchError::Attachment {
                path: self.attachment_path.clone(),
                source,
            })
    }
}

/// Builds the message for one customer's rendered invoice.
pub fn compose(
    dataset: &InvoiceDataset,
    config: &DispatchConfig,
    attachment_path: PathBuf,
) -> Message {
    let customer = dataset.customer();
    let period = dataset.period();
    let count = dataset.events().len();
    let noun = if count == 1 { "entry" } else { "entries" };
    Message {
        recipient: config.recipient().to_string(),
        sender: config.sender().to_string(),
        subject: format!("Invoice {customer} - {period}"),
        body: format!(
            "Hello,\n\nattached is the invoice for customer {customer} covering {}.\n\n\
             Total time: {} ({count} {noun})\n",
            period.display_name(),
            dataset.total_hours_minutes(),
        ),
        attachment_path,
    }
}

/// Delivers invoice messages.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: &Message) -> Result<(), DispatchError>;
}

/// Creates the dispatcher described by the `[dispatch]` section.
pub fn from_config(config: &DispatchConfig) -> Result<Arc<dyn Dispatcher>, DispatchError> {
    Ok(match config {
        DispatchConfig::Outbox { dir, .. } => Arc::new(OutboxDispatcher::new(dir.clone())),
        DispatchConfig::Webhook { url, token, .. } => {
            Arc::new(WebhookDispatcher::new(url.clone(), token.clone())?)
        }
    })
}

/// Writes each message as `<uuid>.eml` into a spool directory.
#[derive(Debug, Clone)]
pub struct OutboxDispatcher {
    dir: PathBuf,
}

impl OutboxDispatcher {
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Dispatcher for OutboxDispatcher {
    async fn dispatch(&self, message: &Message) -> Result<(), DispatchError> {
        let attachment = message.read_attachment().await?;
        let id = Uuid::new_v4();
        let content = format_mime(message, &attachment, &format!("bill-{id}"));

        let path = self.dir.join(format!("{id}.eml"));
        let spool_err = |source| DispatchError::Spool {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(spool_err)?;
        tokio::fs::write(&path, content).await.map_err(spool_err)?;

        tracing::info!(to = %message.recipient, path = %path.display(), "queued invoice message");
        Ok(())
    }
}

/// Renders a multipart/mixed message with the attachment as an 8bit text part.
fn format_mime(message: &Message, attachment: &str, boundary: &str) -> String {
    let name = message.attachment_name();
    let content_type = if name.ends_with(".json") {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };
    let crlf = |text: &str| text.lines().collect::<Vec<_>>().join("\r\n");

    let mut out = String::new();
    out.push_str(&format!("From: {}\r\n", message.sender));
    out.push_str(&format!("To: {}\r\n", message.recipient));
    out.push_str(&format!("Subject: {}\r\n", message.subject));
    out.push_str(&format!("Date: {}\r\n", chrono::Utc::now().to_rfc2822()));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"
    ));

    out.push_str(&format!("--{boundary}\r\n"));
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
    out.push_str(&crlf(&message.body));
    out.push_str("\r\n");

    out.push_str(&format!("--{boundary}\r\n"));
    out.push_str(&format!("Content-Type: {content_type}\r\n"));
    out.push_str(&format!(
        "Content-Disposition: attachment; filename=\"{name}\"\r\n"
    ));
    out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
    out.push_str(&crlf(attachment));
    out.push_str("\r\n");

    out.push_str(&format!("--{boundary}--\r\n"));
    out
}

/// POSTs each message as JSON.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    sender: &'a str,
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
    attachment_name: String,
    attachment: String,
}

impl WebhookDispatcher {
    pub fn new(url: String, token: Option<String>) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(concat!("bill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DispatchError::ClientBuild)?;
        Ok(Self { http, url, token })
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    async fn dispatch(&self, message: &Message) -> Result<(), DispatchError> {
        let payload = WebhookPayload {
            sender: &message.sender,
            recipient: &message.recipient,
            subject: &message.subject,
            body: &message.body,
            attachment_name: message.attachment_name(),
            attachment: message.read_attachment().await?,
        };

        let mut request = self.http.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status,
                body: body.trim().chars().take(200).collect(),
            });
        }

        tracing::info!(to = %message.recipient, %status, "posted invoice message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bill_core::{BillingPeriod, CustomerCode, Event, aggregate, classify};
    use chrono::NaiveDate;

    fn dataset() -> InvoiceDataset {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let event = Event {
            uid: None,
            start,
            end: Some(start + chrono::Duration::minutes(90)),
            all_day: false,
            summary: "Planning".to_string(),
            description: "ABC: sprint planning".to_string(),
        };
        let period = BillingPeriod::new(3, 2024).unwrap();
        aggregate(classify(event), period)
            .datasets
            .remove(&CustomerCode::new("ABC").unwrap())
            .unwrap()
    }

    fn outbox_config(dir: PathBuf) -> DispatchConfig {
        DispatchConfig::Outbox {
            dir,
            sender: "billing@example.com".to_string(),
            recipient: "abc@example.com".to_string(),
        }
    }

    fn message_with_attachment(dir: &Path) -> Message {
        let attachment = dir.join("ABC_2024-03.txt");
        std::fs::write(&attachment, "INVOICE ABC - March 2024\nTotal: 01:30\n").unwrap();
        compose(&dataset(), &outbox_config(dir.join("outbox")), attachment)
    }

    #[test]
    fn compose_names_customer_and_period() {
        let message = compose(
            &dataset(),
            &outbox_config(PathBuf::from("/tmp/outbox")),
            PathBuf::from("ABC_2024-03.txt"),
        );
        assert_eq!(message.subject, "Invoice ABC - 03/2024");
        assert_eq!(message.sender, "billing@example.com");
        assert_eq!(message.recipient, "abc@example.com");
        assert!(message.body.contains("customer ABC covering March 2024"));
        assert!(message.body.contains("Total time: 01:30 (1 entry)"));
    }

    #[tokio::test]
    async fn outbox_writes_mime_message() {
        let temp = tempfile::tempdir().unwrap();
        let message = message_with_attachment(temp.path());
        let outbox = OutboxDispatcher::new(temp.path().join("outbox"));

        outbox.dispatch(&message).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(outbox.dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "eml");

        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(content.starts_with("From: billing@example.com\r\nTo: abc@example.com\r\n"));
        assert!(content.contains("Subject: Invoice ABC - 03/2024\r\n"));
        assert!(content.contains("Content-Type: multipart/mixed; boundary=\"bill-"));
        assert!(content.contains("filename=\"ABC_2024-03.txt\""));
        assert!(content.contains("INVOICE ABC - March 2024\r\nTotal: 01:30\r\n"));
        assert!(content.trim_end().ends_with("--"));
    }

    #[tokio::test]
    async fn missing_attachment_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let message = compose(
            &dataset(),
            &outbox_config(temp.path().join("outbox")),
            temp.path().join("gone.txt"),
        );
        let err = OutboxDispatcher::new(temp.path().join("outbox"))
            .dispatch(&message)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Attachment { .. }));
    }

    #[tokio::test]
    async fn webhook_posts_json_with_token() {
        let temp = tempfile::tempdir().unwrap();
        let message = message_with_attachment(temp.path());

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("authorization", "Bearer t0ken")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "recipient": "abc@example.com",
                "subject": "Invoice ABC - 03/2024",
                "attachment_name": "ABC_2024-03.txt",
            })))
            .with_status(202)
            .create_async()
            .await;

        let hook =
            WebhookDispatcher::new(format!("{}/hook", server.url()), Some("t0ken".to_string()))
                .unwrap();
        hook.dispatch(&message).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_failure_status_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let message = message_with_attachment(temp.path());

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("mailer down")
            .create_async()
            .await;

        let hook = WebhookDispatcher::new(format!("{}/hook", server.url()), None).unwrap();
        match hook.dispatch(&message).await.unwrap_err() {
            DispatchError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "mailer down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_config_builds_both_kinds() {
        assert!(from_config(&outbox_config(PathBuf::from("/tmp/outbox"))).is_ok());
        let webhook = DispatchConfig::Webhook {
            url: "https://hooks.example.com/bill".to_string(),
            token: None,
            sender: "billing@example.com".to_string(),
            recipient: "abc@example.com".to_string(),
        };
        assert!(from_config(&webhook).is_ok());
    }
}
