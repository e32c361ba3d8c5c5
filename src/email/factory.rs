//! Closed dispatch from provider type to handler

use super::gmail::GmailProvider;
use super::mailgun::MailgunProvider;
use super::netcore::NetcoreProvider;
use super::provider::{EmailProvider, EmailProviderError};
use crate::config::MailgunConfig;
use crate::domain::{Connection, FieldSchema, ProviderKind, ProviderOptions};
use std::sync::Arc;
use std::time::Duration;

/// Static options for a provider type
pub fn describe(kind: ProviderKind) -> ProviderOptions {
    match kind {
        ProviderKind::Gmail => GmailProvider::options(),
        ProviderKind::Mailgun => MailgunProvider::options(),
        ProviderKind::Netcore => NetcoreProvider::options(),
    }
}

/// Field schema for a provider type
pub fn schema(kind: ProviderKind) -> FieldSchema {
    describe(kind).fields
}

/// Builds one handler per attempt from a decrypted connection
#[cfg_attr(test, mockall::automock)]
pub trait EmailProviderFactory: Send + Sync {
    fn create(&self, connection: Arc<Connection>)
        -> Result<Box<dyn EmailProvider>, EmailProviderError>;
}

/// Factory backed by a shared HTTP client
#[derive(Clone)]
pub struct DefaultEmailProviderFactory {
    client: reqwest::Client,
    mailgun: MailgunConfig,
}

impl DefaultEmailProviderFactory {
    pub fn new(timeout: Duration, mailgun: MailgunConfig) -> Result<Self, EmailProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmailProviderError::invalid("http_client", e.to_string()))?;
        Ok(Self { client, mailgun })
    }

    pub fn with_client(client: reqwest::Client, mailgun: MailgunConfig) -> Self {
        Self { client, mailgun }
    }
}

impl EmailProviderFactory for DefaultEmailProviderFactory {
    fn create(
        &self,
        connection: Arc<Connection>,
    ) -> Result<Box<dyn EmailProvider>, EmailProviderError> {
        let provider: Box<dyn EmailProvider> = match connection.provider_type {
            ProviderKind::Gmail => Box::new(GmailProvider::new(connection)),
            ProviderKind::Mailgun => Box::new(MailgunProvider::new(
                self.client.clone(),
                self.mailgun.clone(),
                connection,
            )),
            ProviderKind::Netcore => Box::new(NetcoreProvider::new(connection)),
        };
        Ok(provider)
    }
}
