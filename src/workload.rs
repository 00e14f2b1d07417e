use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::*;

/// Endless random request stream for one worker.
///
/// The three request kinds are equally likely. Targets are uniform over
/// `resources`; book sizes are uniform over `seats`. Reseeding with the same
/// seed replays the same stream.
pub struct RandomWorkload {
    rng: StdRng,
    resources: Vec<ResourceId>,
    seats: RangeInclusive<Seats>,
}

impl RandomWorkload {
    /// Panics if `resources` is empty or `seats` is an empty range.
    pub fn new(seed: u64, resources: Vec<ResourceId>, seats: RangeInclusive<Seats>) -> Self {
        assert!(!resources.is_empty(), "workload needs at least one resource");
        assert!(!seats.is_empty(), "empty seat range");
        Self {
            rng: StdRng::seed_from_u64(seed),
            resources,
            seats,
        }
    }

    fn resource(&mut self) -> ResourceId {
        self.resources[self.rng.gen_range(0..self.resources.len())]
    }
}

impl Iterator for RandomWorkload {
    type Item = Request;

    fn next(&mut self) -> Option<Request> {
        let request = match self.rng.gen_range(0..3) {
            0 => Request::Inquire {
                resource: self.resource(),
            },
            1 => Request::Book {
                resource: self.resource(),
                seats: self.rng.gen_range(self.seats.clone()),
            },
            _ => Request::Cancel,
        };
        Some(request)
    }
}

/// Derive a per-worker seed from the run seed so workers don't replay each other.
pub fn worker_seed(run_seed: u64, worker: WorkerId) -> u64 {
    run_seed ^ u64::from(worker).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
