//! Outbound delivery log

use crate::domain::SendOutcome;
use async_trait::async_trait;
use uuid::Uuid;

/// Receives exactly one outcome per delivery request.
///
/// Persisting delivery history belongs to the implementor; a failing sink
/// must not change the outcome returned to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryLogSink: Send + Sync {
    async fn record(&self, log_id: Uuid, outcome: &SendOutcome);
}

/// Writes each outcome as one structured tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDeliveryLog;

#[async_trait]
impl DeliveryLogSink for TracingDeliveryLog {
    async fn record(&self, log_id: Uuid, outcome: &SendOutcome) {
        let provider_used = outcome.provider_used.map(|id| id.to_string());

        if outcome.success {
            tracing::info!(
                %log_id,
                provider_used = provider_used.as_deref().unwrap_or(""),
                failed_attempts = outcome.failures.len(),
                detail = %outcome.message,
                "Email delivered"
            );
        } else {
            tracing::warn!(
                %log_id,
                error_code = outcome.error_code,
                failed_attempts = outcome.failures.len(),
                detail = %outcome.message,
                "Email delivery failed"
            );
        }
    }
}
