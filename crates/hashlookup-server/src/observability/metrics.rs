//! Prometheus Metrics
//!
//! Metrics tracked:
//! - `hashlookup_requests_total` - served streams by protocol and outcome
//! - `hashlookup_request_duration_seconds` - time spent serving a stream
//! - `hashlookup_discovery_attempts_total` - discovery cycles started by clients
//! - `hashlookup_candidate_failures_total` - candidates skipped after a failed open
//! - `hashlookup_member_admissions_total` - membership changes by outcome
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests call these freely.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metric_descriptions();
    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(
        "hashlookup_requests_total",
        "Inbound protocol streams served, by protocol and outcome"
    );
    describe_histogram!(
        "hashlookup_request_duration_seconds",
        "Time from stream accept to response written, in seconds"
    );
    describe_counter!(
        "hashlookup_discovery_attempts_total",
        "Peer discovery cycles started by the discovery client"
    );
    describe_counter!(
        "hashlookup_candidate_failures_total",
        "Candidate peers skipped because a stream could not be opened"
    );
    describe_counter!(
        "hashlookup_member_admissions_total",
        "Cluster membership changes handled, by outcome"
    );
}

/// Record one served stream. `outcome` is `ok`, `aborted`, `read_failed`
/// or `write_failed`.
pub fn record_request(protocol: &str, outcome: &str, duration: Duration) {
    counter!(
        "hashlookup_requests_total",
        "protocol" => protocol.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "hashlookup_request_duration_seconds",
        "protocol" => protocol.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_discovery_attempt(rendezvous: &str) {
    counter!("hashlookup_discovery_attempts_total", "rendezvous" => rendezvous.to_string())
        .increment(1);
}

pub fn record_candidate_failure(protocol: &str) {
    counter!("hashlookup_candidate_failures_total", "protocol" => protocol.to_string())
        .increment(1);
}

pub fn record_member_admission(outcome: &str) {
    counter!("hashlookup_member_admissions_total", "outcome" => outcome.to_string()).increment(1);
}
