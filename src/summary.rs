use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::Engine;
use crate::executor::{Worker, WorkerStats};
use crate::model::*;

/// What one worker did and what it still holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub worker: WorkerId,
    pub stats: WorkerStats,
    /// Seats held by un-cancelled bookings, per resource.
    pub outstanding: BTreeMap<ResourceId, Seats>,
}

impl WorkerSummary {
    pub fn of(worker: &Worker) -> Self {
        Self {
            worker: worker.id(),
            stats: worker.stats().clone(),
            outstanding: worker.bookings().seats_by_resource(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub resource: ResourceId,
    pub capacity: Seats,
    pub available: Seats,
    pub booked: Seats,
}

/// End-of-run report: per-worker counters plus final seat counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub workers: Vec<WorkerSummary>,
    pub resources: Vec<ResourceSummary>,
}

impl RunSummary {
    pub fn collect(engine: &Engine, mut workers: Vec<WorkerSummary>) -> Self {
        workers.sort_by_key(|w| w.worker);
        let resources = engine
            .ledger
            .snapshot()
            .into_iter()
            .map(|(resource, count)| ResourceSummary {
                resource,
                capacity: count.total,
                available: count.available,
                booked: count.total - count.available,
            })
            .collect();
        Self { workers, resources }
    }

    /// `capacity == available + outstanding bookings` for every resource.
    pub fn is_conserved(&self) -> bool {
        self.resources.iter().all(|r| {
            let held: Seats = self
                .workers
                .iter()
                .filter_map(|w| w.outstanding.get(&r.resource))
                .sum();
            r.capacity == r.available + held
        })
    }

    pub fn totals(&self) -> WorkerStats {
        let mut t = WorkerStats::default();
        for w in &self.workers {
            let s = &w.stats;
            t.total += s.total;
            t.completed += s.completed;
            t.timed_out += s.timed_out;
            t.retries += s.retries;
            t.inquiries += s.inquiries;
            t.booked += s.booked;
            t.booking_rejected += s.booking_rejected;
            t.cancelled += s.cancelled;
            t.nothing_to_cancel += s.nothing_to_cancel;
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RetryPolicy;
    use crate::sink::NullSink;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn summary_tracks_bookings() {
        let engine = Arc::new(Engine::new(5, &[(1, 10), (2, 20)]).unwrap());
        let policy = RetryPolicy {
            budget: 0,
            backoff_min: Duration::ZERO,
            backoff_max: Duration::ZERO,
        };
        let mut w = Worker::new(1, engine.clone(), Arc::new(NullSink), policy, 1);
        w.execute(Request::Book { resource: 1, seats: 3 });
        w.execute(Request::Book { resource: 2, seats: 7 });
        w.execute(Request::Inquire { resource: 2 });

        let summary = RunSummary::collect(&engine, vec![WorkerSummary::of(&w)]);
        assert!(summary.is_conserved());
        assert_eq!(summary.resources[0].booked, 3);
        assert_eq!(summary.resources[1].available, 13);
        assert_eq!(summary.totals().booked, 2);
        assert_eq!(summary.totals().completed, 3);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["workers"][0]["outstanding"]["2"], 7);
    }

    #[test]
    fn missing_bookings_break_conservation() {
        let engine = Engine::new(5, &[(1, 10)]).unwrap();
        engine.ledger.debit(1, 4).unwrap();
        let summary = RunSummary::collect(&engine, Vec::new());
        assert!(!summary.is_conserved());
    }
}
