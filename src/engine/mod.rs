mod admission;
mod conflict;
mod error;
mod ledger;

pub use admission::{Admission, AdmissionTable, OBSERVER};
pub use error::EngineError;
pub use ledger::{Insufficient, ResourceLedger, SeatCount};

use crate::model::*;

/// Shared state every worker operates on: the admission table and the seat ledger.
/// Bookings are not here; each worker owns its own.
pub struct Engine {
    pub table: AdmissionTable,
    pub ledger: ResourceLedger,
}

impl Engine {
    /// Build an engine with `slots` admission rows and the given resources at full capacity.
    pub fn new(slots: usize, resources: &[(ResourceId, Seats)]) -> Result<Self, EngineError> {
        if slots == 0 {
            return Err(EngineError::NoSlots);
        }
        if resources.is_empty() {
            return Err(EngineError::NoResources);
        }
        let ledger = ResourceLedger::new();
        for &(id, capacity) in resources {
            if !ledger.register(id, capacity) {
                return Err(EngineError::DuplicateResource(id));
            }
        }
        Ok(Self {
            table: AdmissionTable::new(slots),
            ledger,
        })
    }

    /// Try to start an operation of `kind` on `resource` for `owner`.
    /// Panics if the resource was never registered.
    pub fn try_admit(
        &self,
        owner: WorkerId,
        resource: ResourceId,
        kind: OpKind,
    ) -> Result<Admission<'_>, AdmissionDenial> {
        assert!(self.ledger.contains(resource), "unknown resource {resource}");
        self.table.try_enter(owner, resource, kind)
    }
}
