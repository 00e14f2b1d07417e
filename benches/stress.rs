use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use seatgate::engine::Engine;
use seatgate::executor::{RetryPolicy, Worker};
use seatgate::model::Completion;
use seatgate::sink::NullSink;
use seatgate::summary::{RunSummary, WorkerSummary};
use seatgate::workload::RandomWorkload;

const OPS_PER_WORKER: usize = 5_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: n=0");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

struct Scenario {
    name: &'static str,
    workers: u32,
    slots: usize,
    resources: u32,
}

fn run(scenario: &Scenario) {
    println!(
        "\n== {} ({} workers, {} slots, {} resources)",
        scenario.name, scenario.workers, scenario.slots, scenario.resources
    );
    let resources: Vec<_> = (1..=scenario.resources).map(|id| (id, 1_000)).collect();
    let engine = Arc::new(Engine::new(scenario.slots, &resources).unwrap());
    let ids: Vec<_> = resources.iter().map(|(id, _)| *id).collect();
    let policy = RetryPolicy {
        budget: 20,
        backoff_min: Duration::from_micros(10),
        backoff_max: Duration::from_micros(100),
    };

    let start = Instant::now();
    let results: Vec<(WorkerSummary, Vec<Duration>, Vec<Duration>)> = thread::scope(|s| {
        let handles: Vec<_> = (1..=scenario.workers)
            .map(|id| {
                let engine = engine.clone();
                let ids = ids.clone();
                s.spawn(move || {
                    let mut worker = Worker::new(id, engine, Arc::new(NullSink), policy, u64::from(id));
                    let workload = RandomWorkload::new(u64::from(id) * 7919, ids, 1..=10);
                    let mut completed = Vec::with_capacity(OPS_PER_WORKER);
                    let mut timed_out = Vec::new();
                    for request in workload.take(OPS_PER_WORKER) {
                        let t = Instant::now();
                        match worker.execute(request) {
                            Completion::Completed(_) => completed.push(t.elapsed()),
                            Completion::TimedOut { .. } => timed_out.push(t.elapsed()),
                        }
                    }
                    (WorkerSummary::of(&worker), completed, timed_out)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let elapsed = start.elapsed();

    let mut completed = Vec::new();
    let mut timed_out = Vec::new();
    let mut summaries = Vec::new();
    for (summary, c, t) in results {
        summaries.push(summary);
        completed.extend(c);
        timed_out.extend(t);
    }
    let summary = RunSummary::collect(&engine, summaries);
    let totals = summary.totals();
    let (grants, contended) = engine.table.lock_stats();

    println!(
        "  {} ops in {:.2}s ({:.0} ops/s), {} retries, {} timed out",
        totals.total,
        elapsed.as_secs_f64(),
        totals.total as f64 / elapsed.as_secs_f64(),
        totals.retries,
        totals.timed_out
    );
    println!("  fair lock: {grants} grants, {contended} contended");
    print_latency("completed", &mut completed);
    print_latency("timed out", &mut timed_out);
    assert!(summary.is_conserved(), "seat conservation violated");
}

fn main() {
    println!("=== seatgate admission stress ===");
    let scenarios = [
        Scenario {
            name: "single hot resource",
            workers: 8,
            slots: 5,
            resources: 1,
        },
        Scenario {
            name: "spread load",
            workers: 8,
            slots: 5,
            resources: 16,
        },
        Scenario {
            name: "tiny table",
            workers: 16,
            slots: 1,
            resources: 4,
        },
        Scenario {
            name: "wide table",
            workers: 16,
            slots: 64,
            resources: 64,
        },
    ];
    for scenario in &scenarios {
        run(scenario);
    }
}
