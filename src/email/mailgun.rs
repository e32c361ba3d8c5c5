//! Mailgun email provider implementation
//!
//! Talks to the Mailgun HTTP API: `GET /v4/domains` to verify a connection
//! and `POST /v3/{domain}/messages` to send.

use super::payload::{
    body_variants, load_attachments, render_recipients, AttachmentPayload, FormFields, Payload,
};
use super::provider::{connection_schema, EmailProvider, EmailProviderError};
use crate::config::MailgunConfig;
use crate::domain::{
    AuthResult, Connection, EmailAddress, EmailRequest, FieldSpec, ProcessedEmail, ProviderOptions,
    ProviderTier, SendReceipt,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;
use validator::ValidateEmail;

/// Headers Mailgun derives from dedicated form fields
const RESERVED_HEADERS: [&str; 7] = [
    "from",
    "to",
    "cc",
    "bcc",
    "subject",
    "reply-to",
    "content-type",
];

/// Mailgun email provider
pub struct MailgunProvider {
    client: reqwest::Client,
    endpoints: MailgunConfig,
    connection: Arc<Connection>,
}

impl MailgunProvider {
    pub fn new(client: reqwest::Client, endpoints: MailgunConfig, connection: Arc<Connection>) -> Self {
        Self {
            client,
            endpoints,
            connection,
        }
    }

    pub fn options() -> ProviderOptions {
        ProviderOptions {
            title: "Mailgun Connection",
            description: "Enter the details below to connect with your Mailgun account.",
            fields: connection_schema(vec![
                FieldSpec::password("api_key", "API Key")
                    .required()
                    .encrypted()
                    .with_placeholder("Enter your Mailgun API key"),
                FieldSpec::text("domain", "Domain")
                    .required()
                    .with_placeholder("Enter your Mailgun domain"),
                FieldSpec::select("region", "Region", vec![("US", "US"), ("EU", "EU")])
                    .with_default(json!("US"))
                    .with_placeholder("Select your Mailgun region"),
            ]),
            icon: "MailGunIcon",
            display_name: "Mailgun",
            provider_type: ProviderTier::Free,
            field_order: vec![
                "connection_title",
                "api_key",
                "region",
                "domain",
                "from_email",
                "force_from_email",
                "from_name",
                "force_from_name",
                "priority",
            ],
            sequence: Some(30),
        }
    }

    /// API base for the connection's region, US unless `EU` is selected
    fn api_base(&self) -> &str {
        let base = match self.connection.field_str("region") {
            Some(region) if region.eq_ignore_ascii_case("EU") => &self.endpoints.api_base_eu,
            _ => &self.endpoints.api_base_us,
        };
        base.trim_end_matches('/')
    }

    fn api_key(&self) -> Result<&str, EmailProviderError> {
        self.connection
            .field_str("api_key")
            .ok_or_else(|| EmailProviderError::invalid("api_key", "Mailgun API key is missing."))
    }

    /// Build the ordered form fields of a message
    pub(crate) fn message_fields(request: &EmailRequest, processed: &ProcessedEmail) -> FormFields {
        let (text, html) = body_variants(&request.body, processed.is_html);

        let mut fields = FormFields::new();
        fields
            .push("from", format_sender(&processed.from))
            .push("to", render_recipients(&processed.to))
            .push("subject", request.subject.trim())
            .push_non_empty("html", html)
            .push_non_empty("text", text)
            .push_non_empty("h:Reply-To", render_recipients(&processed.reply_to))
            .push_non_empty("cc", render_recipients(&processed.cc))
            .push_non_empty("bcc", render_recipients(&processed.bcc));

        let mut headers: Vec<_> = processed
            .headers
            .iter()
            .filter(|(name, _)| {
                !RESERVED_HEADERS
                    .iter()
                    .any(|reserved| name.eq_ignore_ascii_case(reserved))
            })
            .collect();
        headers.sort();
        for (name, value) in headers {
            fields.push_non_empty(format!("h:{}", name), value.as_str());
        }

        fields
    }
}

fn format_sender(from: &EmailAddress) -> String {
    match from.name.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(name) => format!("{} <{}>", name.trim(), from.email),
        None => from.email.clone(),
    }
}

fn email_domain(email: &str) -> Option<&str> {
    email.rsplit_once('@').map(|(_, domain)| domain)
}

#[async_trait]
impl EmailProvider for MailgunProvider {
    async fn authenticate(&self) -> Result<AuthResult, EmailProviderError> {
        let connection = &self.connection;
        let (api_key, domain, from_email) = match (
            connection.field_str("api_key"),
            connection.field_str("domain"),
            connection.from_email(),
        ) {
            (Some(k), Some(d), Some(f)) => (k, d, f),
            _ => {
                return Err(EmailProviderError::auth(
                    400,
                    "API key, domain, or from email is missing in the connection data.",
                ))
            }
        };

        if !from_email.to_string().validate_email() {
            return Err(EmailProviderError::auth(
                400,
                "The \"From Email\" is not a valid email address.",
            ));
        }

        let url = format!("{}/v4/domains", self.api_base());
        let response = self
            .client
            .get(&url)
            .basic_auth("api", Some(api_key))
            .send()
            .await
            .map_err(|e| EmailProviderError::transport("Failed to fetch domains: ", &e))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(EmailProviderError::auth(
                status,
                "Failed to validate API key or retrieve domains. Please check your API key.",
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EmailProviderError::transport("Failed to fetch domains: ", &e))?;
        let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let items = parsed.get("items").and_then(Value::as_array).ok_or_else(|| {
            EmailProviderError::MalformedResponse("Invalid response received from Mailgun API.".to_string())
        })?;

        let active = items.iter().any(|item| {
            let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
            let state = item.get("state").and_then(Value::as_str).unwrap_or_default();
            name.eq_ignore_ascii_case(domain) && state == "active"
        });
        if !active {
            return Err(EmailProviderError::auth(
                404,
                "Domain is not active or does not exist in your Mailgun account.",
            ));
        }

        let sender_domain = email_domain(from_email).unwrap_or_default();
        if !sender_domain.eq_ignore_ascii_case(domain) {
            return Err(EmailProviderError::auth(
                400,
                "The domain of the \"From Email\" does not match the connection domain.",
            ));
        }

        Ok(AuthResult::success(
            "Mailgun connection authenticated successfully.",
        ))
    }

    async fn send(
        &self,
        request: &EmailRequest,
        log_id: Uuid,
        processed: &ProcessedEmail,
    ) -> Result<SendReceipt, EmailProviderError> {
        let domain = self
            .connection
            .field_str("domain")
            .ok_or_else(|| EmailProviderError::invalid("domain", "Mailgun domain is missing."))?;
        let api_key = self.api_key()?;

        let url = format!("{}/v3/{}/messages", self.api_base(), domain);
        let fields = Self::message_fields(request, processed);
        let attachments = AttachmentPayload::new(load_attachments(&processed.attachments).await);
        let payload = Payload::build(fields, attachments);

        tracing::debug!(
            %log_id,
            connection_id = %self.connection.id,
            content_type = %payload.content_type(),
            "Posting message to Mailgun"
        );

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(api_key))
            .header(CONTENT_TYPE, payload.content_type())
            .body(payload.to_bytes())
            .send()
            .await
            .map_err(|e| EmailProviderError::transport("Mailgun send failed: ", &e))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

        if status == 200 || status == 202 {
            return Ok(SendReceipt {
                message: "Email sent successfully via Mailgun.".to_string(),
                provider_message_id: parsed.get("id").and_then(Value::as_str).map(String::from),
            });
        }

        let reason = parsed
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error.");
        Err(EmailProviderError::ProviderRejected {
            status,
            message: format!("Mailgun send failed: {}", reason),
        })
    }

    fn describe(&self) -> ProviderOptions {
        Self::options()
    }

    fn provider_name(&self) -> &'static str {
        "mailgun"
    }
}
