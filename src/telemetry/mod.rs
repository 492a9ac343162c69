//! Telemetry initialization: tracing and Prometheus metrics

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise tracing and install the Prometheus recorder.
///
/// Returns `Some(PrometheusHandle)` so the HTTP server can expose a
/// `/metrics` endpoint; `None` if a recorder was already installed.
pub fn init() -> Option<PrometheusHandle> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "academia_core=debug,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe_metrics();
            Some(handle)
        }
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {}", e);
            None
        }
    }
}

/// Register metric descriptions so the exposition includes HELP/TYPE lines
/// from startup, not just after first use.
fn describe_metrics() {
    describe_counter!(
        "academia_gate_rejections_total",
        "Requests rejected by the gating pipeline, labeled by stage"
    );
    describe_counter!(
        "academia_rate_limit_throttled_total",
        "Requests rejected by the rate gate, labeled by route class"
    );
}
