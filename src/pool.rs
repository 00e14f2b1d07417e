use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::executor::Worker;
use crate::model::WorkerId;
use crate::sink::LifecycleSink;
use crate::summary::WorkerSummary;
use crate::workload::{RandomWorkload, worker_seed};

/// Longest uninterrupted think-time sleep; bounds how late a worker notices `stop`.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Fixed set of worker threads, each looping over its own workload until stopped.
///
/// Workers block (fair-lock spinning, backoff sleeps), so each gets a dedicated
/// OS thread. They all start at once regardless of the runtime's blocking-pool
/// size. Summaries come back over a oneshot so `join` can wait with a deadline.
pub struct Pool {
    stop: Arc<AtomicBool>,
    handles: Vec<WorkerHandle>,
}

struct WorkerHandle {
    id: WorkerId,
    thread: JoinHandle<()>,
    done: oneshot::Receiver<WorkerSummary>,
}

impl Pool {
    /// Spawn `config.workers` workers with ids 1..=workers.
    ///
    /// If a thread cannot be created, the workers already started are told to
    /// stop and the error is returned.
    pub fn spawn(
        engine: Arc<Engine>,
        config: &Config,
        sink: Arc<dyn LifecycleSink>,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let run_seed = config.seed.unwrap_or_else(rand::random);
        let resources = engine.ledger.resource_ids();
        info!(workers = config.workers, run_seed, "starting worker pool");

        let mut handles = Vec::with_capacity(config.workers as usize);
        for id in 1..=config.workers {
            let seed = worker_seed(run_seed, id);
            let worker = Worker::new(
                id,
                engine.clone(),
                sink.clone(),
                config.retry_policy(),
                seed.rotate_left(32),
            );
            let workload = RandomWorkload::new(seed, resources.clone(), config.seat_range());
            let (tx, done) = oneshot::channel();
            let worker_stop = stop.clone();
            let think_time = config.think_time;
            let spawned = thread::Builder::new()
                .name(format!("seat-worker-{id}"))
                .spawn(move || {
                    let summary = run_worker(worker, workload, &worker_stop, think_time);
                    // The pool may have given up on this worker already.
                    let _ = tx.send(summary);
                });
            match spawned {
                Ok(thread) => handles.push(WorkerHandle { id, thread, done }),
                Err(e) => {
                    warn!(worker = id, "failed to spawn worker thread: {e}");
                    stop.store(true, Ordering::Release);
                    return Err(e);
                }
            }
        }

        Ok(Self { stop, handles })
    }

    /// Ask every worker to finish its current operation and exit.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Workers that have not exited yet.
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.thread.is_finished()).count()
    }

    /// Wait for every worker, giving up on stragglers after `deadline`.
    /// Returns the summaries of the workers that exited and the number still running.
    ///
    /// A worker that panicked broke a core invariant; the panic is re-raised here.
    pub async fn join(self, deadline: Duration) -> (Vec<WorkerSummary>, usize) {
        let give_up = tokio::time::Instant::now() + deadline;
        let mut summaries = Vec::with_capacity(self.handles.len());
        let mut stuck = 0;
        for WorkerHandle { id, thread, done } in self.handles {
            match tokio::time::timeout_at(give_up, done).await {
                Ok(Ok(summary)) => summaries.push(summary),
                Ok(Err(_)) => {
                    // The sender only drops unsent when the worker thread unwinds.
                    if let Ok(Err(payload)) = tokio::task::spawn_blocking(move || thread.join()).await {
                        std::panic::resume_unwind(payload);
                    }
                    warn!(worker = id, "worker exited without a summary");
                    stuck += 1;
                }
                Err(_) => stuck += 1,
            }
        }
        (summaries, stuck)
    }
}

fn run_worker(
    mut worker: Worker,
    workload: RandomWorkload,
    stop: &AtomicBool,
    think_time: Duration,
) -> WorkerSummary {
    metrics::gauge!(crate::observability::WORKERS_ACTIVE).increment(1.0);
    for request in workload {
        if stop.load(Ordering::Acquire) {
            break;
        }
        worker.execute(request);
        pause(think_time, stop);
    }
    metrics::gauge!(crate::observability::WORKERS_ACTIVE).decrement(1.0);
    WorkerSummary::of(&worker)
}

/// Sleep for `total`, waking early once `stop` is set.
fn pause(total: Duration, stop: &AtomicBool) {
    let until = Instant::now() + total;
    loop {
        let now = Instant::now();
        if now >= until || stop.load(Ordering::Acquire) {
            return;
        }
        std::thread::sleep((until - now).min(STOP_POLL));
    }
}
