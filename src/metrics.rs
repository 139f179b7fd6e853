// src/metrics.rs
//! Prometheus exporter wiring for the feed service.

use std::time::Duration;

use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish static gauges for the
    /// two cache-tier TTLs.
    pub fn init(memory_ttl: Duration, dataset_ttl: Duration) -> Self {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        gauge!("feed_memory_cache_ttl_seconds").set(memory_ttl.as_secs_f64());
        gauge!("feed_durable_cache_ttl_seconds").set(dataset_ttl.as_secs_f64());

        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
