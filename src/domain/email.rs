//! Email request and delivery outcome types

use super::connection::{Connection, ConnectionId};
use super::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Email address with optional display name
///
/// An empty `email` marks a malformed recipient; payload rendering drops it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Html,
}

/// An attachment, either a file on disk or in-memory content
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attachment {
    Path(PathBuf),
    Blob { name: String, content: Vec<u8> },
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attachment::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Attachment::Blob { name, content } => f
                .debug_struct("Blob")
                .field("name", name)
                .field("len", &content.len())
                .finish(),
        }
    }
}

/// A logical email submitted for delivery
///
/// Immutable once handed to the orchestrator, which only ever borrows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    /// Sender requested by the caller; connections may force their own
    #[serde(default)]
    pub from: Option<EmailAddress>,
    pub to: Vec<EmailAddress>,
    #[serde(default)]
    pub cc: Vec<EmailAddress>,
    #[serde(default)]
    pub bcc: Vec<EmailAddress>,
    #[serde(default)]
    pub reply_to: Vec<EmailAddress>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl EmailRequest {
    pub fn new(to: EmailAddress, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: vec![to],
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn html(mut self) -> Self {
        self.content_type = ContentType::Html;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Recipient and sender data normalized for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEmail {
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub is_html: bool,
    pub headers: HashMap<String, String>,
    pub attachments: Vec<Attachment>,
}

impl ProcessedEmail {
    /// Resolve the sender against a connection's `force_from_*` flags.
    ///
    /// A forced connection value always wins; otherwise the request's own
    /// sender is used and the connection's values act as fallback. The name
    /// falls back to `default_from_name` last.
    pub fn prepare(request: &EmailRequest, connection: &Connection, default_from_name: &str) -> Self {
        let requested = request.from.as_ref();
        let requested_email = requested
            .map(|a| a.email.trim())
            .filter(|e| !e.is_empty());
        let requested_name = requested
            .and_then(|a| a.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let email = if connection.force_from_email {
            connection.from_email().or(requested_email)
        } else {
            requested_email.or(connection.from_email())
        };
        let name = if connection.force_from_name {
            connection.from_name().or(requested_name)
        } else {
            requested_name.or(connection.from_name())
        };

        Self {
            from: EmailAddress {
                email: email.unwrap_or_default().to_string(),
                name: Some(name.unwrap_or(default_from_name).to_string()),
            },
            to: request.to.clone(),
            cc: request.cc.clone(),
            bcc: request.bcc.clone(),
            reply_to: request.reply_to.clone(),
            is_html: request.content_type == ContentType::Html,
            headers: request.headers.clone(),
            attachments: request.attachments.clone(),
        }
    }
}

/// Successful provider hand-off
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub message: String,
    pub provider_message_id: Option<String>,
}

impl SendReceipt {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            provider_message_id: None,
        }
    }
}

/// Result of authenticating a connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthResult {
    pub success: bool,
    pub message: String,
    pub error_code: u16,
}

impl AuthResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: 200,
        }
    }

    pub fn failure(error_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code,
        }
    }
}

/// One failed attempt against one connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptFailure {
    pub connection_id: ConnectionId,
    pub provider_type: ProviderKind,
    pub title: String,
    pub error_code: u16,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): [{}] {}",
            self.title, self.provider_type, self.error_code, self.message
        )
    }
}

/// Final outcome of one delivery request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    pub message: String,
    pub error_code: u16,
    pub provider_used: Option<ConnectionId>,
    /// Failed attempts in the order they were made
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<AttemptFailure>,
}

impl SendOutcome {
    pub fn sent(connection_id: ConnectionId, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: 200,
            provider_used: Some(connection_id),
            failures: Vec::new(),
        }
    }

    pub fn failed(error_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code,
            provider_used: None,
            failures: Vec::new(),
        }
    }

    pub fn with_failures(mut self, failures: Vec<AttemptFailure>) -> Self {
        self.failures = failures;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn connection(force_email: bool, force_name: bool) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            provider_type: ProviderKind::Mailgun,
            title: "Primary".to_string(),
            fields: HashMap::from([
                ("from_email".to_string(), json!("alerts@mg.example.com")),
                ("from_name".to_string(), json!("Alerts")),
            ]),
            priority: 10,
            force_from_email: force_email,
            force_from_name: force_name,
            created_at: Utc::now(),
            version: 1,
        }
    }

    fn request() -> EmailRequest {
        EmailRequest {
            from: Some(EmailAddress::with_name("me@example.com", "Me")),
            ..EmailRequest::new(EmailAddress::new("you@example.com"), "Hi", "Body")
        }
    }

    #[test]
    fn test_prepare_prefers_request_sender() {
        let processed = ProcessedEmail::prepare(&request(), &connection(false, false), "WordPress");
        assert_eq!(processed.from, EmailAddress::with_name("me@example.com", "Me"));
        assert!(!processed.is_html);
    }

    #[test]
    fn test_prepare_forced_sender() {
        let processed = ProcessedEmail::prepare(&request(), &connection(true, true), "WordPress");
        assert_eq!(
            processed.from,
            EmailAddress::with_name("alerts@mg.example.com", "Alerts")
        );
    }

    #[test]
    fn test_prepare_falls_back_to_connection_and_default_name() {
        let mut conn = connection(false, false);
        conn.fields.remove("from_name");
        let req = EmailRequest::new(EmailAddress::new("you@example.com"), "Hi", "Body").html();

        let processed = ProcessedEmail::prepare(&req, &conn, "WordPress");
        assert_eq!(
            processed.from,
            EmailAddress::with_name("alerts@mg.example.com", "WordPress")
        );
        assert!(processed.is_html);
    }

    #[test]
    fn test_attachment_debug_omits_content() {
        let attachment = Attachment::Blob {
            name: "secret.txt".to_string(),
            content: b"classified".to_vec(),
        };
        let output = format!("{:?}", attachment);
        assert!(output.contains("secret.txt"));
        assert!(!output.contains("classified"));
    }

    #[test]
    fn test_request_deserializes_path_and_blob_attachments() {
        let request: EmailRequest = serde_json::from_value(json!({
            "to": [{"email": "jane@x.com", "name": "Jane Doe"}, {"name": "No Email"}],
            "subject": "Report",
            "body": "<p>Attached</p>",
            "content_type": "html",
            "attachments": ["/tmp/report.pdf", {"name": "a.txt", "content": [104, 105]}]
        }))
        .unwrap();

        assert_eq!(request.to[1].email, "");
        assert_eq!(request.content_type, ContentType::Html);
        assert_eq!(request.attachments[0], Attachment::Path("/tmp/report.pdf".into()));
        assert_eq!(
            request.attachments[1],
            Attachment::Blob {
                name: "a.txt".to_string(),
                content: b"hi".to_vec()
            }
        );
    }

    #[test]
    fn test_outcome_builders() {
        let id = Uuid::new_v4();
        let sent = SendOutcome::sent(id, "ok");
        assert!(sent.success);
        assert_eq!(sent.provider_used, Some(id));

        let failed = SendOutcome::failed(503, "nope");
        assert!(!failed.success);
        assert!(failed.provider_used.is_none());
        assert_eq!(failed.error_code, 503);
    }
}
