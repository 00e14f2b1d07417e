use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::model::{AdmissionDenial, LifecycleEvent, Phase};
use crate::sink::LifecycleSink;

// ── Operation metrics ───────────────────────────────────────────

/// Counter: operations finished. Labels: outcome.
pub const OPERATIONS_TOTAL: &str = "seatgate_operations_total";

/// Counter: operations abandoned after exhausting the retry budget.
pub const OPERATIONS_TIMED_OUT_TOTAL: &str = "seatgate_operations_timed_out_total";

/// Histogram: request-to-completion latency in seconds. Labels: kind, status.
pub const OPERATION_DURATION_SECONDS: &str = "seatgate_operation_duration_seconds";

// ── Contention metrics ──────────────────────────────────────────

/// Counter: denied admission attempts. Labels: reason.
pub const ADMISSION_DENIED_TOTAL: &str = "seatgate_admission_denied_total";

/// Gauge: occupied admission table rows.
pub const ADMISSION_SLOTS_ACTIVE: &str = "seatgate_admission_slots_active";

/// Counter: fair lock grants that had to queue.
pub const FAIR_LOCK_CONTENDED_TOTAL: &str = "seatgate_fair_lock_contended_total";

/// Gauge: running workers.
pub const WORKERS_ACTIVE: &str = "seatgate_workers_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Lifecycle sink that writes structured `tracing` events and bumps counters.
pub struct LogSink;

impl LifecycleSink for LogSink {
    fn emit(&self, event: &LifecycleEvent) {
        let LifecycleEvent { worker, seq, phase } = *event;
        match phase {
            Phase::Requested(request) => debug!(worker, seq, %request, "requested"),
            Phase::Waiting {
                attempt,
                backoff,
                denial,
            } => {
                let reason = match denial {
                    AdmissionDenial::TableFull => "table_full",
                    AdmissionDenial::Conflict { .. } => "conflict",
                };
                metrics::counter!(ADMISSION_DENIED_TOTAL, "reason" => reason).increment(1);
                debug!(worker, seq, attempt, ?backoff, %denial, "waiting");
            }
            Phase::Admitted { slot } => debug!(worker, seq, slot, "admitted"),
            Phase::Completed(outcome) => {
                metrics::counter!(OPERATIONS_TOTAL, "outcome" => outcome.label()).increment(1);
                info!(worker, seq, %outcome, "completed");
            }
            Phase::TimedOut { attempts } => {
                metrics::counter!(OPERATIONS_TIMED_OUT_TOTAL).increment(1);
                warn!(worker, seq, attempts, "timed out waiting for admission");
            }
        }
    }
}
