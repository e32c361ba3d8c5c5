//! Prometheus metrics setup and metric definitions

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const DELIVERY_ATTEMPTS_TOTAL: &str = "courier_delivery_attempts_total";
pub const DELIVERY_TOTAL: &str = "courier_delivery_total";
pub const PROVIDER_REQUEST_DURATION_SECONDS: &str = "courier_provider_request_duration_seconds";

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    // Upper buckets cover the 30s default attempt timeout.
    let buckets = vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

    PrometheusBuilder::new()
        .set_buckets(&buckets)?
        .install_recorder()
}

/// Register descriptions and zero-valued series for the delivery metrics.
pub fn describe_metrics() {
    describe_counter!(
        DELIVERY_ATTEMPTS_TOTAL,
        "Provider attempts by provider and outcome"
    );
    describe_counter!(DELIVERY_TOTAL, "Delivery requests by final outcome");
    describe_histogram!(
        PROVIDER_REQUEST_DURATION_SECONDS,
        "Provider attempt duration in seconds"
    );

    counter!(DELIVERY_TOTAL, "outcome" => "sent").absolute(0);
    counter!(DELIVERY_ATTEMPTS_TOTAL, "provider" => "mailgun", "outcome" => "sent").absolute(0);
    histogram!(PROVIDER_REQUEST_DURATION_SECONDS, "provider" => "mailgun").record(0.0);
}
