//! Email provider trait and error types

use crate::domain::{
    AuthResult, Connection, EmailRequest, FieldSchema, FieldSpec, ProcessedEmail, ProviderOptions,
    SendReceipt,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Per-attempt provider error types
///
/// None of these abort a delivery on their own: the orchestrator records
/// them against the connection and moves on to the next candidate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmailProviderError {
    #[error("Invalid configuration for `{field_name}`: {reason}")]
    InvalidConfiguration { field_name: String, reason: String },

    #[error("{message}")]
    AuthenticationFailed { code: u16, message: String },

    #[error("{message}")]
    TransportFailure { code: u16, message: String },

    #[error("{message}")]
    ProviderRejected { status: u16, message: String },

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    MalformedResponse(String),
}

impl EmailProviderError {
    pub fn invalid(field_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field_name: field_name.into(),
            reason: reason.into(),
        }
    }

    pub fn auth(code: u16, message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            code,
            message: message.into(),
        }
    }

    /// Classify a reqwest failure, keeping the raw transport message.
    pub fn transport(context: &str, err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            408
        } else if let Some(status) = err.status() {
            status.as_u16()
        } else if err.is_connect() {
            503
        } else {
            502
        };

        Self::TransportFailure {
            code,
            message: format!("{}{}", context, err),
        }
    }

    /// Numeric code reported in outcomes
    pub fn error_code(&self) -> u16 {
        match self {
            Self::InvalidConfiguration { .. } => 400,
            Self::AuthenticationFailed { code, .. } => *code,
            Self::TransportFailure { code, .. } => *code,
            Self::ProviderRejected { status, .. } => *status,
            Self::NotImplemented(_) => 501,
            Self::MalformedResponse(_) => 500,
        }
    }

    /// Failure class used for logs and metrics.
    ///
    /// An unimplemented handler counts as a transport failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::TransportFailure { .. } | Self::NotImplemented(_) => "transport_failure",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<EmailProviderError> for AuthResult {
    fn from(err: EmailProviderError) -> Self {
        AuthResult::failure(err.error_code(), err.to_string())
    }
}

/// Trait for provider handlers
///
/// A handler is built for a single attempt from one decrypted connection and
/// must not keep state across requests or mutate that connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Verify the connection's credentials with the provider
    async fn authenticate(&self) -> Result<AuthResult, EmailProviderError>;

    /// Hand one email to the provider
    async fn send(
        &self,
        request: &EmailRequest,
        log_id: Uuid,
        processed: &ProcessedEmail,
    ) -> Result<SendReceipt, EmailProviderError>;

    /// Static description of the provider
    fn describe(&self) -> ProviderOptions;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

/// Fields shared by every provider's connection, placed after its own.
pub(crate) fn connection_schema(mut specific: Vec<FieldSpec>) -> FieldSchema {
    specific.push(
        FieldSpec::text("from_email", "From Email")
            .required()
            .with_placeholder("Enter the sender email address"),
    );
    specific.push(
        FieldSpec::text("from_name", "From Name").with_placeholder("Enter the sender name"),
    );
    FieldSchema::new(specific)
}

/// Authentication for providers without a verification endpoint.
pub(crate) fn authenticate_required_fields(
    schema: &FieldSchema,
    connection: &Connection,
    display_name: &str,
) -> Result<AuthResult, EmailProviderError> {
    schema.check_required(&connection.fields).map_err(|e| match e {
        crate::error::AppError::InvalidConfiguration { field_name, reason } => {
            EmailProviderError::InvalidConfiguration { field_name, reason }
        }
        other => EmailProviderError::invalid("fields", other.to_string()),
    })?;

    Ok(AuthResult::success(format!(
        "{} connection saved successfully.",
        display_name
    )))
}
