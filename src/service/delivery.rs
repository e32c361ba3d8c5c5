//! Delivery Orchestrator
//!
//! One pass per request: candidates are tried strictly in priority order,
//! each at most once, until one accepts the message. Every failure is kept
//! so an exhausted pass reports the full trail.

use super::delivery_log::DeliveryLogSink;
use super::registry::ConnectionRegistry;
use crate::config::DeliveryConfig;
use crate::domain::{
    AttemptFailure, AuthResult, Connection, ConnectionFilter, ConnectionId, EmailRequest,
    ProcessedEmail, SendOutcome, SendReceipt,
};
use crate::email::{EmailProviderError, EmailProviderFactory};
use crate::error::Result;
use crate::repository::ConnectionRepository;
use crate::telemetry::metrics::{
    DELIVERY_ATTEMPTS_TOTAL, DELIVERY_TOTAL, PROVIDER_REQUEST_DURATION_SECONDS,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Terminal conditions of a delivery pass
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("No email connections are configured")]
    NoConnectionsConfigured,

    #[error("All {} configured connections failed", .0.len())]
    AllProvidersFailed(Vec<AttemptFailure>),

    #[error("Delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    pub fn error_code(&self) -> u16 {
        match self {
            Self::NoConnectionsConfigured => 400,
            Self::AllProvidersFailed(_) => 502,
            Self::Cancelled => 499,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::NoConnectionsConfigured => "no_connections",
            Self::AllProvidersFailed(_) => "all_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<DeliveryError> for SendOutcome {
    fn from(err: DeliveryError) -> Self {
        let outcome = SendOutcome::failed(err.error_code(), err.to_string());
        match err {
            DeliveryError::AllProvidersFailed(failures) => outcome.with_failures(failures),
            _ => outcome,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Authenticate each connection before its send
    pub authenticate_before_send: bool,
    /// Upper bound on one connection's authenticate + send
    pub attempt_timeout: Duration,
    pub default_from_name: String,
}

impl From<&DeliveryConfig> for DeliveryOptions {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            authenticate_before_send: config.authenticate_before_send,
            attempt_timeout: config.http_timeout(),
            default_from_name: config.default_from_name.clone(),
        }
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

pub struct DeliveryOrchestrator<R: ConnectionRepository> {
    registry: Arc<ConnectionRegistry<R>>,
    factory: Arc<dyn EmailProviderFactory>,
    log_sink: Arc<dyn DeliveryLogSink>,
    options: DeliveryOptions,
}

impl<R: ConnectionRepository> DeliveryOrchestrator<R> {
    pub fn new(
        registry: Arc<ConnectionRegistry<R>>,
        factory: Arc<dyn EmailProviderFactory>,
        log_sink: Arc<dyn DeliveryLogSink>,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            registry,
            factory,
            log_sink,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry<R>> {
        &self.registry
    }

    /// Deliver one email through the first connection that accepts it
    pub async fn deliver(&self, request: &EmailRequest) -> SendOutcome {
        self.execute(request, None, std::future::pending()).await
    }

    /// Deliver using only the connections matching `filter`
    pub async fn deliver_filtered(
        &self,
        request: &EmailRequest,
        filter: &ConnectionFilter,
    ) -> SendOutcome {
        self.execute(request, Some(filter), std::future::pending())
            .await
    }

    /// Deliver unless `cancel` completes first.
    ///
    /// On cancellation the in-flight provider call is dropped. A send the
    /// provider already accepted is not undone.
    pub async fn deliver_until<F>(&self, request: &EmailRequest, cancel: F) -> SendOutcome
    where
        F: Future<Output = ()>,
    {
        self.execute(request, None, cancel).await
    }

    /// Authenticate one stored connection
    pub async fn verify(&self, id: ConnectionId) -> Result<AuthResult> {
        let connection = self.registry.get(id)?;
        let plain = self.registry.decrypted(&connection)?;

        let result = match self.factory.create(plain) {
            Ok(provider) => {
                match tokio::time::timeout(self.options.attempt_timeout, provider.authenticate())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(self.timed_out()),
                }
            }
            Err(e) => Err(e),
        };

        let auth = result.unwrap_or_else(AuthResult::from);
        tracing::info!(
            connection_id = %id,
            provider = %connection.provider_type,
            success = auth.success,
            error_code = auth.error_code,
            "Connection verified"
        );
        Ok(auth)
    }

    async fn execute<F>(
        &self,
        request: &EmailRequest,
        filter: Option<&ConnectionFilter>,
        cancel: F,
    ) -> SendOutcome
    where
        F: Future<Output = ()>,
    {
        let log_id = Uuid::new_v4();
        let span = tracing::info_span!("deliver", %log_id);

        let result = async {
            tokio::select! {
                biased;
                _ = cancel => Err(DeliveryError::Cancelled),
                result = self.run(request, filter, log_id) => result,
            }
        }
        .instrument(span)
        .await;

        let outcome = match result {
            Ok(outcome) => {
                metrics::counter!(DELIVERY_TOTAL, "outcome" => "sent").increment(1);
                outcome
            }
            Err(err) => {
                metrics::counter!(DELIVERY_TOTAL, "outcome" => err.label()).increment(1);
                SendOutcome::from(err)
            }
        };

        self.log_sink.record(log_id, &outcome).await;
        outcome
    }

    async fn run(
        &self,
        request: &EmailRequest,
        filter: Option<&ConnectionFilter>,
        log_id: Uuid,
    ) -> std::result::Result<SendOutcome, DeliveryError> {
        let candidates = self.registry.list_usable_connections(filter);
        if candidates.is_empty() {
            tracing::warn!("No usable connections for delivery");
            return Err(DeliveryError::NoConnectionsConfigured);
        }

        let mut failures = Vec::with_capacity(candidates.len());

        for connection in &candidates {
            let provider = connection.provider_type.as_str();
            let started = Instant::now();
            let result = self.attempt(request, log_id, connection).await;
            metrics::histogram!(PROVIDER_REQUEST_DURATION_SECONDS, "provider" => provider)
                .record(started.elapsed().as_secs_f64());

            match result {
                Ok(receipt) => {
                    metrics::counter!(DELIVERY_ATTEMPTS_TOTAL, "provider" => provider, "outcome" => "sent")
                        .increment(1);
                    tracing::info!(
                        connection_id = %connection.id,
                        provider,
                        provider_message_id = receipt.provider_message_id.as_deref().unwrap_or(""),
                        "Provider accepted email"
                    );
                    return Ok(SendOutcome::sent(connection.id, receipt.message)
                        .with_failures(failures));
                }
                Err(err) => {
                    metrics::counter!(DELIVERY_ATTEMPTS_TOTAL, "provider" => provider, "outcome" => err.kind())
                        .increment(1);
                    tracing::warn!(
                        connection_id = %connection.id,
                        provider,
                        error_kind = err.kind(),
                        error_code = err.error_code(),
                        error = %err,
                        "Provider attempt failed, trying next connection"
                    );
                    failures.push(AttemptFailure {
                        connection_id: connection.id,
                        provider_type: connection.provider_type,
                        title: connection.title.clone(),
                        error_code: err.error_code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        Err(DeliveryError::AllProvidersFailed(failures))
    }

    /// One connection, one handler, at most one authenticate and one send
    async fn attempt(
        &self,
        request: &EmailRequest,
        log_id: Uuid,
        connection: &Connection,
    ) -> std::result::Result<SendReceipt, EmailProviderError> {
        let plain = self
            .registry
            .decrypted(connection)
            .map_err(|e| EmailProviderError::invalid("credentials", e.to_string()))?;
        let processed = ProcessedEmail::prepare(request, &plain, &self.options.default_from_name);
        let provider = self.factory.create(plain)?;

        let call = async {
            if self.options.authenticate_before_send {
                let auth = provider.authenticate().await?;
                if !auth.success {
                    return Err(EmailProviderError::auth(auth.error_code, auth.message));
                }
            }
            provider.send(request, log_id, &processed).await
        };

        match tokio::time::timeout(self.options.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }

    fn timed_out(&self) -> EmailProviderError {
        EmailProviderError::TransportFailure {
            code: 408,
            message: format!(
                "Provider did not respond within {} seconds",
                self.options.attempt_timeout.as_secs_f64()
            ),
        }
    }
}
