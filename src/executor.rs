use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use ulid::Ulid;

use crate::bookings::BookingLedger;
use crate::engine::{Admission, Engine, Insufficient, ResourceLedger};
use crate::model::*;
use crate::sink::LifecycleSink;

/// How long to keep retrying a denied admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means a single try.
    pub budget: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Uniform jitter in `[backoff_min, backoff_max]`.
    fn backoff(&self, rng: &mut impl Rng) -> Duration {
        if self.backoff_max <= self.backoff_min {
            return self.backoff_min;
        }
        let lo = self.backoff_min.as_micros() as u64;
        let hi = self.backoff_max.as_micros() as u64;
        Duration::from_micros(rng.gen_range(lo..=hi))
    }
}

/// Per-worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub total: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub retries: u64,
    pub inquiries: u64,
    pub booked: u64,
    pub booking_rejected: u64,
    pub cancelled: u64,
    pub nothing_to_cancel: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &Outcome) {
        self.completed += 1;
        match outcome {
            Outcome::Available { .. } => self.inquiries += 1,
            Outcome::Booked(_) => self.booked += 1,
            Outcome::BookingRejected { .. } => self.booking_rejected += 1,
            Outcome::Cancelled(_) => self.cancelled += 1,
            Outcome::NothingToCancel => self.nothing_to_cancel += 1,
        }
    }
}

/// A request resolved against the worker's own state: cancels know their booking.
#[derive(Debug, Clone, Copy)]
enum Plan {
    Inquire(ResourceId),
    Book(ResourceId, Seats),
    Cancel(Booking),
}

impl Plan {
    fn resource(&self) -> ResourceId {
        match self {
            Plan::Inquire(r) | Plan::Book(r, _) => *r,
            Plan::Cancel(b) => b.resource,
        }
    }

    fn kind(&self) -> OpKind {
        match self {
            Plan::Inquire(_) => OpKind::Read,
            Plan::Book(..) | Plan::Cancel(_) => OpKind::Write,
        }
    }
}

/// One worker's executor: admission with retry, the operation body, release.
///
/// ```text
/// Requested → Waiting* → Admitted → Completed
/// Requested → Waiting* → TimedOut
/// ```
///
/// Nothing in the ledger or the booking list changes before `Admitted`, so a
/// timed-out operation leaves no trace besides its events.
pub struct Worker {
    id: WorkerId,
    engine: Arc<Engine>,
    sink: Arc<dyn LifecycleSink>,
    policy: RetryPolicy,
    bookings: BookingLedger,
    rng: StdRng,
    seq: u64,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        engine: Arc<Engine>,
        sink: Arc<dyn LifecycleSink>,
        policy: RetryPolicy,
        seed: u64,
    ) -> Self {
        Self {
            id,
            engine,
            sink,
            policy,
            bookings: BookingLedger::new(),
            rng: StdRng::seed_from_u64(seed),
            seq: 0,
            stats: WorkerStats::default(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn bookings(&self) -> &BookingLedger {
        &self.bookings
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Run one request to completion or timeout.
    pub fn execute(&mut self, request: Request) -> Completion {
        self.seq += 1;
        let seq = self.seq;
        self.stats.total += 1;
        self.emit(seq, Phase::Requested(request));
        let started = Instant::now();

        let plan = match request {
            Request::Inquire { resource } => Plan::Inquire(resource),
            Request::Book { resource, seats } => Plan::Book(resource, seats),
            Request::Cancel => match self.bookings.choose(&mut self.rng) {
                Some(booking) => Plan::Cancel(booking),
                // Nothing to cancel: report without ever touching the table.
                None => return self.finish(seq, request, Outcome::NothingToCancel, started),
            },
        };

        let engine = Arc::clone(&self.engine);
        let admission = match self.admit(&engine, seq, plan.resource(), plan.kind()) {
            Ok(admission) => admission,
            Err(attempts) => {
                self.stats.timed_out += 1;
                self.emit(seq, Phase::TimedOut { attempts });
                record_duration(request, "timed_out", started);
                return Completion::TimedOut { attempts };
            }
        };
        self.emit(seq, Phase::Admitted { slot: admission.index() });

        let outcome = self.run(&engine.ledger, plan);
        drop(admission);
        self.finish(seq, request, outcome, started)
    }

    fn admit<'e>(
        &mut self,
        engine: &'e Engine,
        seq: u64,
        resource: ResourceId,
        kind: OpKind,
    ) -> Result<Admission<'e>, u32> {
        let mut budget = self.policy.budget;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let denial = match engine.try_admit(self.id, resource, kind) {
                Ok(admission) => return Ok(admission),
                Err(denial) => denial,
            };
            if budget == 0 {
                return Err(attempts);
            }
            budget -= 1;
            self.stats.retries += 1;
            let backoff = self.policy.backoff(&mut self.rng);
            self.emit(
                seq,
                Phase::Waiting {
                    attempt: attempts,
                    backoff,
                    denial,
                },
            );
            std::thread::sleep(backoff);
        }
    }

    /// The operation body. Runs only while holding an admission slot for `plan.resource()`.
    fn run(&mut self, ledger: &ResourceLedger, plan: Plan) -> Outcome {
        match plan {
            Plan::Inquire(resource) => Outcome::Available {
                resource,
                seats: ledger.read(resource),
            },
            Plan::Book(resource, seats) => match ledger.debit(resource, seats) {
                Ok(()) => {
                    let booking = Booking {
                        id: Ulid::new(),
                        resource,
                        seats,
                    };
                    self.bookings.insert(booking);
                    Outcome::Booked(booking)
                }
                Err(Insufficient { available }) => Outcome::BookingRejected {
                    resource,
                    requested: seats,
                    available,
                },
            },
            Plan::Cancel(booking) => {
                ledger.credit(booking.resource, booking.seats);
                self.bookings.remove(booking.id);
                Outcome::Cancelled(booking)
            }
        }
    }

    fn finish(&mut self, seq: u64, request: Request, outcome: Outcome, started: Instant) -> Completion {
        self.stats.record(&outcome);
        self.emit(seq, Phase::Completed(outcome));
        record_duration(request, "completed", started);
        Completion::Completed(outcome)
    }

    fn emit(&self, seq: u64, phase: Phase) {
        self.sink.emit(&LifecycleEvent {
            worker: self.id,
            seq,
            phase,
        });
    }
}

fn record_duration(request: Request, status: &'static str, started: Instant) {
    metrics::histogram!(
        crate::observability::OPERATION_DURATION_SECONDS,
        "kind" => request.label(),
        "status" => status
    )
    .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    const NO_WAIT: RetryPolicy = RetryPolicy {
        budget: 3,
        backoff_min: Duration::ZERO,
        backoff_max: Duration::from_millis(1),
    };

    fn setup(slots: usize, capacity: Seats) -> (Arc<Engine>, Arc<MemorySink>) {
        let engine = Arc::new(Engine::new(slots, &[(1, capacity), (2, capacity)]).unwrap());
        (engine, Arc::new(MemorySink::new()))
    }

    fn worker(id: WorkerId, engine: &Arc<Engine>, sink: &Arc<MemorySink>) -> Worker {
        Worker::new(id, engine.clone(), sink.clone(), NO_WAIT, u64::from(id))
    }

    #[test]
    fn inquire_reports_available() {
        let (engine, sink) = setup(5, 10);
        let mut w = worker(1, &engine, &sink);
        let done = w.execute(Request::Inquire { resource: 1 });
        assert_eq!(
            done,
            Completion::Completed(Outcome::Available {
                resource: 1,
                seats: 10
            })
        );
        let phases = sink.phases(1, 1);
        assert_eq!(phases.len(), 3);
        assert!(matches!(phases[1], Phase::Admitted { slot: 0 }));
    }

    #[test]
    fn book_then_cancel_restores_capacity() {
        let (engine, sink) = setup(5, 10);
        let mut w = worker(1, &engine, &sink);
        let Completion::Completed(Outcome::Booked(b)) =
            w.execute(Request::Book { resource: 1, seats: 6 })
        else {
            panic!("expected booking");
        };
        assert_eq!(engine.ledger.read(1), 4);
        assert_eq!(w.bookings().len(), 1);

        let done = w.execute(Request::Cancel);
        assert_eq!(done, Completion::Completed(Outcome::Cancelled(b)));
        assert_eq!(engine.ledger.read(1), 10);
        assert!(w.bookings().is_empty());
        assert_eq!(engine.table.occupied(), 0);
    }

    #[test]
    fn rejected_booking_changes_nothing() {
        let (engine, sink) = setup(5, 10);
        let mut w1 = worker(1, &engine, &sink);
        let mut w2 = worker(2, &engine, &sink);
        w1.execute(Request::Book { resource: 1, seats: 6 });

        let done = w2.execute(Request::Book { resource: 1, seats: 5 });
        assert_eq!(
            done,
            Completion::Completed(Outcome::BookingRejected {
                resource: 1,
                requested: 5,
                available: 4
            })
        );
        assert_eq!(engine.ledger.read(1), 4);
        assert!(w2.bookings().is_empty());
        assert_eq!(w2.stats().booking_rejected, 1);
        assert_eq!(engine.table.occupied(), 0);
    }

    #[test]
    fn cancel_without_bookings_skips_table() {
        let (engine, sink) = setup(1, 10);
        // Occupy the only slot: a cancel that went through admission would time out.
        let _held = engine.try_admit(50, 1, OpKind::Write).unwrap();
        let (grants_before, _) = engine.table.lock_stats();

        let mut w = worker(1, &engine, &sink);
        assert_eq!(
            w.execute(Request::Cancel),
            Completion::Completed(Outcome::NothingToCancel)
        );
        assert_eq!(engine.table.lock_stats().0, grants_before);
        assert_eq!(engine.ledger.read(1), 10);
        assert_eq!(
            sink.phases(1, 1),
            vec![
                Phase::Requested(Request::Cancel),
                Phase::Completed(Outcome::NothingToCancel)
            ]
        );
    }

    #[test]
    fn timeout_after_budget_mutates_nothing() {
        let (engine, sink) = setup(5, 10);
        let held = engine.try_admit(50, 1, OpKind::Write).unwrap();

        let mut w = worker(1, &engine, &sink);
        let done = w.execute(Request::Book { resource: 1, seats: 3 });
        assert_eq!(done, Completion::TimedOut { attempts: 4 });
        assert_eq!(engine.ledger.read(1), 10);
        assert!(w.bookings().is_empty());
        assert_eq!(w.stats().timed_out, 1);
        assert_eq!(w.stats().retries, 3);

        let phases = sink.phases(1, 1);
        let waits = phases
            .iter()
            .filter(|p| matches!(p, Phase::Waiting { denial: AdmissionDenial::Conflict { owner: 50, .. }, .. }))
            .count();
        assert_eq!(waits, 3);
        assert_eq!(phases.last(), Some(&Phase::TimedOut { attempts: 4 }));

        drop(held);
        assert_eq!(engine.table.occupied(), 0);
    }

    #[test]
    fn timed_out_cancel_keeps_booking() {
        let (engine, sink) = setup(5, 10);
        let mut w = worker(1, &engine, &sink);
        w.execute(Request::Book { resource: 2, seats: 5 });
        let _held = engine.try_admit(50, 2, OpKind::Read).unwrap();

        assert!(matches!(w.execute(Request::Cancel), Completion::TimedOut { .. }));
        assert_eq!(w.bookings().len(), 1);
        assert_eq!(engine.ledger.read(2), 5);
    }

    #[test]
    fn zero_budget_tries_once() {
        let (engine, sink) = setup(1, 10);
        let _held = engine.try_admit(50, 2, OpKind::Read).unwrap();
        let policy = RetryPolicy {
            budget: 0,
            ..NO_WAIT
        };
        let mut w = Worker::new(1, engine.clone(), sink.clone(), policy, 1);
        assert_eq!(
            w.execute(Request::Inquire { resource: 1 }),
            Completion::TimedOut { attempts: 1 }
        );
    }

    #[test]
    fn sequence_numbers_increase() {
        let (engine, sink) = setup(5, 10);
        let mut w = worker(3, &engine, &sink);
        for _ in 0..3 {
            w.execute(Request::Inquire { resource: 2 });
        }
        let seqs: Vec<u64> = sink
            .events()
            .iter()
            .filter(|e| matches!(e.phase, Phase::Requested(_)))
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(w.stats().total, 3);
        assert_eq!(w.stats().inquiries, 3);
    }

    #[test]
    fn backoff_within_range() {
        let policy = RetryPolicy {
            budget: 1,
            backoff_min: Duration::from_millis(2),
            backoff_max: Duration::from_millis(4),
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let d = policy.backoff(&mut rng);
            assert!(d >= policy.backoff_min && d <= policy.backoff_max);
        }
    }
}
