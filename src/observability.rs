use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Rule pipeline ───────────────────────────────────────────────

/// Counter: rules executed. Labels: rule.
pub const RULES_EXECUTED_TOTAL: &str = "fullhouse_rules_executed_total";

/// Counter: rules skipped for an unmet dependency. Labels: rule.
pub const RULES_SKIPPED_TOTAL: &str = "fullhouse_rules_skipped_total";

/// Counter: pipeline runs that ended in a Failure. Labels: context, kind.
pub const PIPELINE_FAILURES_TOTAL: &str = "fullhouse_pipeline_failures_total";

/// Histogram: pipeline run duration in seconds. Labels: context.
pub const PIPELINE_DURATION_SECONDS: &str = "fullhouse_pipeline_duration_seconds";

// ── Caches and sources ──────────────────────────────────────────

/// Counter: cache rebuilds. Labels: cache.
pub const CACHE_REBUILDS_TOTAL: &str = "fullhouse_cache_rebuilds_total";

/// Counter: collaborator calls that failed or timed out. Labels: source.
pub const SOURCE_FAILURES_TOTAL: &str = "fullhouse_source_failures_total";

/// Counter: inventory resolutions that needed a fallback. Labels: step.
pub const INVENTORY_FALLBACK_TOTAL: &str = "fullhouse_inventory_fallback_total";

/// Install a `fmt` subscriber. `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("failed to install Prometheus exporter: {e}"),
    }
}
