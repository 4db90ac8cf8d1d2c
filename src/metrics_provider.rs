use std::sync::LazyLock;

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry,
};
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry as PrometheusRegistry,
    TextEncoder,
};
use tracing::error;

use crate::server::Error;

pub static METRICS_PROVIDER: LazyLock<MetricsProvider> =
    LazyLock::new(|| MetricsProvider::new().expect("Unable to create metrics provider"));

pub struct MetricsProvider {
    registry: PrometheusRegistry,
    pub metric_http_request_total: IntCounter,
    pub metric_http_request_duration: Histogram,
    pub metric_http_connections_in_flight: IntGauge,
    metric_refresh_total: IntCounterVec,
    metric_last_success_timestamp: IntGauge,
}

impl MetricsProvider {
    pub fn new() -> Result<Self, Error> {
        let registry = PrometheusRegistry::new();

        let metric_http_request_total = register_int_counter_with_registry!(
            "http_requests_total",
            "Total number of HTTP requests made.",
            &registry
        )
        .map_err(|error| {
            error!("Unable to create http_requests_total metric: {error}");
            Error::Internal(String::from("Unable to create http_requests_total metric"))
        })?;

        let metric_http_request_duration = register_histogram_with_registry!(
            "http_request_duration_ms",
            "The HTTP request latencies in milliseconds.",
            &registry
        )
        .map_err(|error| {
            error!("Unable to create http_request_duration metric: {error}");
            Error::Internal(String::from(
                "Unable to create http_request_duration metric",
            ))
        })?;

        let metric_http_connections_in_flight = register_int_gauge_with_registry!(
            "http_connections_in_flight",
            "The current number of open HTTP connections.",
            &registry
        )
        .map_err(|error| {
            error!("Unable to create http_connections_in_flight metric: {error}");
            Error::Internal(String::from(
                "Unable to create http_connections_in_flight metric",
            ))
        })?;

        let metric_refresh_total = register_int_counter_vec_with_registry!(
            "discovery_refresh_total",
            "Total number of upstream discovery fetch cycles.",
            &["result"],
            &registry
        )
        .map_err(|error| {
            error!("Unable to create discovery_refresh_total metric: {error}");
            Error::Internal(String::from(
                "Unable to create discovery_refresh_total metric",
            ))
        })?;

        let metric_last_success_timestamp = register_int_gauge_with_registry!(
            "discovery_last_success_timestamp_seconds",
            "Unix time of the last successful upstream discovery fetch.",
            &registry
        )
        .map_err(|error| {
            error!("Unable to create discovery_last_success_timestamp_seconds metric: {error}");
            Error::Internal(String::from(
                "Unable to create discovery_last_success_timestamp_seconds metric",
            ))
        })?;

        Ok(Self {
            registry,
            metric_http_request_total,
            metric_http_request_duration,
            metric_http_connections_in_flight,
            metric_refresh_total,
            metric_last_success_timestamp,
        })
    }

    pub fn record_refresh_success(&self, timestamp: i64) {
        self.metric_refresh_total
            .with_label_values(&["success"])
            .inc();
        self.metric_last_success_timestamp.set(timestamp);
    }

    pub fn record_refresh_failure(&self) {
        self.metric_refresh_total
            .with_label_values(&["failure"])
            .inc();
    }

    pub fn gather(&self) -> Result<(String, Vec<u8>), Error> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|error| Error::Internal(format!("Unable to encode metrics: {error}")))?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
