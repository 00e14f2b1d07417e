use dashmap::DashMap;
use serde::Serialize;

use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeatCount {
    pub total: Seats,
    pub available: Seats,
}

/// `debit` could not be satisfied; nothing was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insufficient {
    pub available: Seats,
}

/// Authoritative seat counts per resource.
///
/// Each call holds a DashMap shard lock only for the duration of the read or
/// update. Callers are expected to hold an admission slot for the resource;
/// the shard lock is a secondary guard, not the concurrency mechanism.
///
/// Touching an unregistered resource panics.
pub struct ResourceLedger {
    seats: DashMap<ResourceId, SeatCount>,
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self {
            seats: DashMap::new(),
        }
    }

    /// Register a resource at full capacity. Returns false if the id already exists.
    pub(crate) fn register(&self, resource: ResourceId, capacity: Seats) -> bool {
        if self.seats.contains_key(&resource) {
            return false;
        }
        self.seats.insert(
            resource,
            SeatCount {
                total: capacity,
                available: capacity,
            },
        );
        true
    }

    pub fn contains(&self, resource: ResourceId) -> bool {
        self.seats.contains_key(&resource)
    }

    pub fn read(&self, resource: ResourceId) -> Seats {
        self.count(resource).available
    }

    fn count(&self, resource: ResourceId) -> SeatCount {
        match self.seats.get(&resource) {
            Some(entry) => *entry.value(),
            None => panic!("unknown resource {resource}"),
        }
    }

    pub fn debit(&self, resource: ResourceId, seats: Seats) -> Result<(), Insufficient> {
        let Some(mut entry) = self.seats.get_mut(&resource) else {
            panic!("unknown resource {resource}");
        };
        if seats > entry.available {
            return Err(Insufficient {
                available: entry.available,
            });
        }
        entry.available -= seats;
        Ok(())
    }

    pub fn credit(&self, resource: ResourceId, seats: Seats) {
        let Some(mut entry) = self.seats.get_mut(&resource) else {
            panic!("unknown resource {resource}");
        };
        let total = entry.total;
        let available = match entry.available.checked_add(seats) {
            Some(available) if available <= total => available,
            _ => panic!("credit of {seats} on resource {resource} exceeds capacity {total}"),
        };
        entry.available = available;
    }

    /// All registered ids, ascending.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.seats.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// `(id, count)` for every resource, ascending by id.
    pub fn snapshot(&self) -> Vec<(ResourceId, SeatCount)> {
        let mut all: Vec<_> = self.seats.iter().map(|e| (*e.key(), *e.value())).collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }
}
