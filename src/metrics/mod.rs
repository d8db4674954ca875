use axum::{routing::get, Router};
use axum_prometheus::metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use axum_prometheus::PrometheusMetricLayer;
use metrics::describe_counter;
use std::sync::OnceLock;

// The recorder is process-global and installing it twice panics.
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Setup Prometheus metrics collection with proper descriptions
///
/// Counters cover upstream traffic, feed assembly, and both cache tiers.
pub fn setup_metrics() -> (PrometheusMetricLayer<'static>, Router) {
    let handle = HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install metrics recorder");
            register_metric_descriptions();
            handle
        })
        .clone();

    let layer = PrometheusMetricLayer::new();
    let app = Router::new().route("/metrics", get(move || async move { handle.render() }));

    (layer, app)
}

fn register_metric_descriptions() {
    describe_counter!(
        "scholarfeed_upstream_requests_total",
        "Requests issued to the bibliographic index"
    );

    describe_counter!(
        "scholarfeed_upstream_retries_total",
        "Upstream requests retried after a transient failure"
    );

    describe_counter!(
        "scholarfeed_searches_total",
        "Search plans executed against the upstream"
    );

    describe_counter!(
        "scholarfeed_fanout_tasks_total",
        "Per-entity fetch tasks spawned for the following feed"
    );

    describe_counter!(
        "scholarfeed_paper_cache_hits_total",
        "Paper cache lookups that were served locally"
    );

    describe_counter!(
        "scholarfeed_paper_cache_misses_total",
        "Paper cache lookups that fell through"
    );

    describe_counter!(
        "scholarfeed_request_cache_hits_total",
        "Feed responses served from the request cache"
    );

    describe_counter!(
        "scholarfeed_request_cache_misses_total",
        "Feed requests that had to be assembled"
    );

    describe_counter!("scholarfeed_errors_total", "Errors by type");
}

/// Record an error with type label
pub fn record_error(error_type: &str) {
    metrics::counter!(
        "scholarfeed_errors_total",
        "error_type" => error_type.to_string()
    )
    .increment(1);
}
