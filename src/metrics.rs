// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const SCRAPE_REQUESTS: &str = "scrape_requests_total";
pub const SCRAPE_FAILURES: &str = "scrape_failures_total";
pub const SCRAPE_RECORDS: &str = "scrape_records_total";
pub const SCRAPE_ITEM_ERRORS: &str = "scrape_item_errors_total";
pub const SCRAPE_DURATION_MS: &str = "scrape_duration_ms";
pub const LOADER_ITERATIONS: &str = "loader_iterations";

/// Register descriptions once per process; recording works without it.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(SCRAPE_REQUESTS, "Scrape calls accepted, by strategy.");
        describe_counter!(
            SCRAPE_FAILURES,
            "Scrape calls that ended in an error, by error kind."
        );
        describe_counter!(SCRAPE_RECORDS, "Records returned to callers.");
        describe_counter!(
            SCRAPE_ITEM_ERRORS,
            "Items skipped because their fields could not be read."
        );
        describe_histogram!(
            SCRAPE_DURATION_MS,
            "Wall time of a scrape call, navigation through close, in milliseconds."
        );
        describe_histogram!(
            LOADER_ITERATIONS,
            "Scroll iterations before the incremental loader saw a stable plateau."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already set.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
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
