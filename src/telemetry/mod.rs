//! Logging and metrics bootstrap for the CLI

pub mod metrics;

use crate::config::TelemetryConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the stderr log subscriber, then the Prometheus recorder if
/// `METRICS_ENABLED` is set. The handle renders the end-of-command snapshot.
pub fn init(config: &TelemetryConfig) -> Option<PrometheusHandle> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courier_core=info"));
    let json = config.log_format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    if !config.metrics_enabled {
        return None;
    }
    match metrics::install_prometheus_recorder() {
        Ok(handle) => {
            metrics::describe_metrics();
            tracing::debug!(service = %config.service_name, "Prometheus recorder installed");
            Some(handle)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Metrics disabled: recorder install failed");
            None
        }
    }
}
