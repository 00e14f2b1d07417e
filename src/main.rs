use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use seatgate::config::Config;
use seatgate::engine::Engine;
use seatgate::observability::LogSink;
use seatgate::pool::Pool;
use seatgate::summary::RunSummary;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    seatgate::observability::init(config.metrics_port);

    let resources = config.resources();
    let engine = Arc::new(Engine::new(config.table_slots, &resources)?);

    info!("seatgate reservation daemon starting");
    info!("  resources: {}", resources.len());
    info!("  workers: {}", config.workers);
    info!("  table_slots: {}", config.table_slots);
    info!(
        "  retry: budget={} backoff={:?}..={:?}",
        config.retry_budget, config.backoff_min, config.backoff_max
    );
    info!("  run_duration: {:?}", config.run_duration);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let pool = Pool::spawn(engine.clone(), &config, Arc::new(LogSink))?;

    // Run for the configured duration, or until SIGTERM/ctrl-c.
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };

    tokio::select! {
        _ = tokio::time::sleep(config.run_duration) => info!("run duration elapsed"),
        _ = shutdown => info!("shutdown signal received"),
    }

    // Let in-flight operations finish (up to 10s).
    pool.stop();
    info!("draining {} workers...", pool.running());
    let (workers, stuck) = pool.join(Duration::from_secs(10)).await;
    if stuck > 0 {
        tracing::warn!("drain timeout, {stuck} workers still running");
    } else {
        info!("all workers drained");
    }

    let summary = RunSummary::collect(&engine, workers);
    info!("current reservation status");
    for r in &summary.resources {
        info!(
            "  resource {}: booked {} available {} of {}",
            r.resource, r.booked, r.available, r.capacity
        );
    }
    let totals = summary.totals();
    info!(
        "  operations: {} total, {} completed, {} timed out",
        totals.total, totals.completed, totals.timed_out
    );
    if stuck == 0 && !summary.is_conserved() {
        tracing::error!("seat conservation violated");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!("seatgate stopped");
    Ok(())
}
