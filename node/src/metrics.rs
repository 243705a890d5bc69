//! # Prometheus Metrics
//!
//! Operational metrics for the registry node, scraped at `/metrics` on the
//! metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use ein_contracts::ErrorKind;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Committed calls, by call name.
    pub calls_accepted_total: IntCounterVec,
    /// Refused calls, by reason (`envelope`, `nonce`, or a registry error kind).
    pub calls_rejected_total: IntCounterVec,
    pub identities_created_total: IntCounter,
    pub recoveries_total: IntCounter,
    pub destructions_total: IntCounter,
    /// Identities that currently exist.
    pub live_identities: IntGauge,
    /// Time spent verifying and executing one call, in seconds.
    pub call_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("ein".into()), None)?;

        let calls_accepted_total = IntCounterVec::new(
            Opts::new("calls_accepted_total", "Registry calls committed"),
            &["call"],
        )?;
        registry.register(Box::new(calls_accepted_total.clone()))?;

        let calls_rejected_total = IntCounterVec::new(
            Opts::new("calls_rejected_total", "Registry calls refused"),
            &["reason"],
        )?;
        registry.register(Box::new(calls_rejected_total.clone()))?;

        let identities_created_total =
            IntCounter::new("identities_created_total", "Identities created")?;
        registry.register(Box::new(identities_created_total.clone()))?;

        let recoveries_total = IntCounter::new("recoveries_total", "Recoveries triggered")?;
        registry.register(Box::new(recoveries_total.clone()))?;

        let destructions_total = IntCounter::new("destructions_total", "Identities destroyed")?;
        registry.register(Box::new(destructions_total.clone()))?;

        let live_identities = IntGauge::new("live_identities", "Identities that currently exist")?;
        registry.register(Box::new(live_identities.clone()))?;

        let call_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "call_latency_seconds",
                "Time to verify and execute one registry call, in seconds",
            )
            .buckets(vec![
                0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(call_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            calls_accepted_total,
            calls_rejected_total,
            identities_created_total,
            recoveries_total,
            destructions_total,
            live_identities,
            call_latency_seconds,
        })
    }

    /// Counts a refusal for a registry error kind.
    pub fn reject_kind(&self, kind: ErrorKind) {
        self.calls_rejected_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Counts a refusal that never reached the registry.
    pub fn reject_envelope(&self, reason: &str) {
        self.calls_rejected_total.with_label_values(&[reason]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_labelled() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.reject_kind(ErrorKind::Freshness);
        metrics.reject_envelope("nonce");
        metrics.calls_accepted_total.with_label_values(&["create_identity"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("ein_calls_rejected_total{reason=\"freshness\"} 1"));
        assert!(text.contains("ein_calls_rejected_total{reason=\"nonce\"} 1"));
        assert!(text.contains("ein_calls_accepted_total{call=\"create_identity\"} 1"));
    }
}
