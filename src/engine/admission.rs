use std::sync::{Mutex, PoisonError};

use crate::lock::FairLock;
use crate::model::*;

use super::conflict::find_conflict;

/// Fair-lock owner id used for read-only inspection. Workers are numbered from 1.
pub const OBSERVER: WorkerId = 0;

/// Fixed row arena with a free-list. O(1) claim and clear by index.
struct SlotArena {
    rows: Box<[Option<ActiveSlot>]>,
    free: Vec<usize>,
}

impl SlotArena {
    fn new(capacity: usize) -> Self {
        Self {
            rows: vec![None; capacity].into_boxed_slice(),
            // Reversed so the lowest index is handed out first.
            free: (0..capacity).rev().collect(),
        }
    }

    fn occupied(&self) -> usize {
        self.rows.len() - self.free.len()
    }

    fn active(&self) -> impl Iterator<Item = &ActiveSlot> {
        self.rows.iter().flatten()
    }
}

/// Bounded table of operations currently allowed to run.
///
/// Every read and write of the rows happens under the [`FairLock`], so the
/// capacity check, the conflict check and the insert are one atomic step.
pub struct AdmissionTable {
    slots: FairLock<SlotArena>,
    /// Serializes inspections so only one caller queues as `OBSERVER` at a time.
    observers: Mutex<()>,
}

impl AdmissionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: FairLock::new(SlotArena::new(capacity)),
            observers: Mutex::new(()),
        }
    }

    /// Claim a row for `owner` if the table has room and nothing on `resource`
    /// conflicts with `kind`. The row is cleared when the returned permit drops.
    pub fn try_enter(
        &self,
        owner: WorkerId,
        resource: ResourceId,
        kind: OpKind,
    ) -> Result<Admission<'_>, AdmissionDenial> {
        assert_ne!(owner, OBSERVER, "worker id {OBSERVER} is reserved for inspection");
        let mut arena = self.slots.acquire(owner);
        if arena.free.is_empty() {
            return Err(AdmissionDenial::TableFull);
        }
        if let Some(blocker) = find_conflict(arena.active(), resource, kind) {
            return Err(AdmissionDenial::Conflict {
                owner: blocker.owner,
                kind: blocker.kind,
            });
        }
        let Some(index) = arena.free.pop() else {
            unreachable!("free-list checked non-empty above");
        };
        arena.rows[index] = Some(ActiveSlot {
            resource,
            kind,
            owner,
        });
        metrics::gauge!(crate::observability::ADMISSION_SLOTS_ACTIVE).set(arena.occupied() as f64);
        drop(arena);

        Ok(Admission {
            table: self,
            index,
            slot: ActiveSlot {
                resource,
                kind,
                owner,
            },
        })
    }

    /// Clear row `index`. Panics if the row is empty or belongs to someone else:
    /// either means a `leave` without a matching `try_enter`.
    pub(crate) fn leave(&self, owner: WorkerId, index: usize) {
        let mut arena = self.slots.acquire(owner);
        let capacity = arena.rows.len();
        let row = arena
            .rows
            .get_mut(index)
            .unwrap_or_else(|| panic!("leave on slot {index} outside table of {capacity}"));
        match row.take() {
            Some(active) if active.owner == owner => {}
            Some(active) => panic!(
                "worker {owner} left slot {index} owned by worker {}",
                active.owner
            ),
            None => panic!("worker {owner} left empty slot {index}"),
        }
        arena.free.push(index);
        metrics::gauge!(crate::observability::ADMISSION_SLOTS_ACTIVE).set(arena.occupied() as f64);
    }

    /// Number of occupied rows.
    pub fn occupied(&self) -> usize {
        let _observer = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        self.slots.acquire(OBSERVER).occupied()
    }

    /// Occupied rows with their indices, in one consistent view.
    pub fn snapshot(&self) -> Vec<(usize, ActiveSlot)> {
        let _observer = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let arena = self.slots.acquire(OBSERVER);
        arena
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.map(|slot| (i, slot)))
            .collect()
    }

    /// `(grants, contended grants)` of the fair lock guarding the rows.
    pub fn lock_stats(&self) -> (u64, u64) {
        (self.slots.acquisitions(), self.slots.contended())
    }
}

/// A claimed admission row. Dropping it runs `leave` exactly once.
#[must_use = "dropping an Admission immediately releases its slot"]
pub struct Admission<'a> {
    table: &'a AdmissionTable,
    index: usize,
    slot: ActiveSlot,
}

impl Admission<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn resource(&self) -> ResourceId {
        self.slot.resource
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.table.leave(self.slot.owner, self.index);
    }
}

impl std::fmt::Debug for Admission<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("index", &self.index)
            .field("slot", &self.slot)
            .finish()
    }
}
