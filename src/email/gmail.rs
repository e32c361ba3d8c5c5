//! Gmail provider
//!
//! Connections can be configured and verified, but sending is not wired to
//! the Gmail API yet.

use super::provider::{
    authenticate_required_fields, connection_schema, EmailProvider, EmailProviderError,
};
use crate::domain::{
    AuthResult, Connection, EmailRequest, FieldSpec, ProcessedEmail, ProviderOptions, ProviderTier,
    SendReceipt,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub struct GmailProvider {
    connection: Arc<Connection>,
}

impl GmailProvider {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn options() -> ProviderOptions {
        ProviderOptions {
            title: "Gmail Connection",
            description: "Enter the details below to connect with your Gmail account.",
            fields: connection_schema(vec![
                FieldSpec::text("client_id", "Client ID")
                    .required()
                    .with_placeholder("Enter your Gmail Client ID"),
                FieldSpec::password("client_secret", "Client Secret")
                    .required()
                    .encrypted()
                    .with_placeholder("Enter your Gmail Client Secret"),
                FieldSpec::text("refresh_token", "Refresh Token")
                    .required()
                    .encrypted()
                    .with_placeholder("Enter your Gmail Refresh Token"),
            ]),
            icon: "GmailIcon",
            display_name: "Gmail",
            provider_type: ProviderTier::Soon,
            field_order: vec![
                "connection_title",
                "client_id",
                "client_secret",
                "refresh_token",
                "from_email",
                "force_from_email",
                "from_name",
                "force_from_name",
                "priority",
            ],
            sequence: None,
        }
    }
}

#[async_trait]
impl EmailProvider for GmailProvider {
    async fn authenticate(&self) -> Result<AuthResult, EmailProviderError> {
        authenticate_required_fields(&Self::options().fields, &self.connection, "Gmail")
    }

    async fn send(
        &self,
        _request: &EmailRequest,
        _log_id: Uuid,
        _processed: &ProcessedEmail,
    ) -> Result<SendReceipt, EmailProviderError> {
        Err(EmailProviderError::NotImplemented(
            "Gmail sending not yet implemented.".to_string(),
        ))
    }

    fn describe(&self) -> ProviderOptions {
        Self::options()
    }

    fn provider_name(&self) -> &'static str {
        "gmail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmailAddress, ProviderKind};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;

    fn connection(fields: HashMap<String, serde_json::Value>) -> Arc<Connection> {
        Arc::new(Connection {
            id: Uuid::new_v4(),
            provider_type: ProviderKind::Gmail,
            title: "Gmail".to_string(),
            fields,
            priority: 10,
            force_from_email: false,
            force_from_name: false,
            created_at: Utc::now(),
            version: 1,
        })
    }

    fn complete_fields() -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("client_id".to_string(), json!("client")),
            ("client_secret".to_string(), json!("secret")),
            ("refresh_token".to_string(), json!("token")),
            ("from_email".to_string(), json!("me@gmail.com")),
        ])
    }

    #[tokio::test]
    async fn test_authenticate_with_required_fields() {
        let provider = GmailProvider::new(connection(complete_fields()));
        let result = provider.authenticate().await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Gmail connection saved successfully.");
    }

    #[tokio::test]
    async fn test_authenticate_missing_field() {
        let mut fields = complete_fields();
        fields.insert("refresh_token".to_string(), json!(""));
        let provider = GmailProvider::new(connection(fields));

        let err = provider.authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            EmailProviderError::InvalidConfiguration { ref field_name, .. } if field_name == "refresh_token"
        ));
    }

    #[tokio::test]
    async fn test_send_not_implemented() {
        let conn = connection(complete_fields());
        let provider = GmailProvider::new(conn.clone());
        let request = EmailRequest::new(EmailAddress::new("a@x.com"), "Hi", "Body");
        let processed = ProcessedEmail::prepare(&request, &conn, "WordPress");

        let err = provider.send(&request, Uuid::new_v4(), &processed).await.unwrap_err();
        assert_eq!(err.to_string(), "Gmail sending not yet implemented.");
        assert_eq!(err.kind(), "transport_failure");
    }

    #[test]
    fn test_options() {
        let options = GmailProvider::options();
        assert_eq!(options.provider_type, ProviderTier::Soon);
        assert!(options.fields.is_encrypted("client_secret"));
        assert!(options.fields.is_encrypted("refresh_token"));
        assert!(!options.fields.is_encrypted("client_id"));
    }
}
