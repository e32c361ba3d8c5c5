//! Netcore provider, configurable but not yet able to send

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

pub struct NetcoreProvider {
    connection: Arc<Connection>,
}

impl NetcoreProvider {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn options() -> ProviderOptions {
        ProviderOptions {
            title: "Netcore Connection",
            description: "Enter the details below to connect with your Netcore account.",
            fields: connection_schema(vec![FieldSpec::password("api_key", "API Key")
                .required()
                .encrypted()
                .with_placeholder("Enter your Netcore API key")]),
            icon: "NetcoreIcon",
            display_name: "Netcore",
            provider_type: ProviderTier::Soon,
            field_order: vec![
                "connection_title",
                "api_key",
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
impl EmailProvider for NetcoreProvider {
    async fn authenticate(&self) -> Result<AuthResult, EmailProviderError> {
        authenticate_required_fields(&Self::options().fields, &self.connection, "Netcore")
    }

    async fn send(
        &self,
        _request: &EmailRequest,
        _log_id: Uuid,
        _processed: &ProcessedEmail,
    ) -> Result<SendReceipt, EmailProviderError> {
        Err(EmailProviderError::NotImplemented(
            "Netcore sending not yet implemented.".to_string(),
        ))
    }

    fn describe(&self) -> ProviderOptions {
        Self::options()
    }

    fn provider_name(&self) -> &'static str {
        "netcore"
    }
}
