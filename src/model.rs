use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Resource (event) identifier. Small positive integer.
pub type ResourceId = u32;

/// Worker identifier, also used as the owner id for the fair lock and admission rows.
pub type WorkerId = u32;

/// Seat units.
pub type Seats = u32;

/// How an operation interacts with other operations on the same resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Shared: compatible with other reads on the same resource.
    Read,
    /// Exclusive: excludes everything else on the same resource.
    Write,
}

impl OpKind {
    pub fn is_exclusive(self) -> bool {
        matches!(self, OpKind::Write)
    }
}

/// A request produced by the workload generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// How many seats are left?
    Inquire { resource: ResourceId },
    /// Reserve `seats` units.
    Book { resource: ResourceId, seats: Seats },
    /// Cancel one of the worker's own bookings. The target is chosen by the worker.
    Cancel,
}

impl Request {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Request::Inquire { .. } => "inquire",
            Request::Book { .. } => "book",
            Request::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Inquire { resource } => write!(f, "inquire(resource={resource})"),
            Request::Book { resource, seats } => {
                write!(f, "book(resource={resource}, seats={seats})")
            }
            Request::Cancel => write!(f, "cancel"),
        }
    }
}

/// A successful reservation, owned by the worker that made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource: ResourceId,
    pub seats: Seats,
}

/// One occupied row of the admission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSlot {
    pub resource: ResourceId,
    pub kind: OpKind,
    pub owner: WorkerId,
}

/// Why `try_enter` said no. Contention, not an error: the executor retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenial {
    /// Every row is occupied.
    TableFull,
    /// A row on the same resource conflicts with the requested kind.
    Conflict { owner: WorkerId, kind: OpKind },
}

impl fmt::Display for AdmissionDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionDenial::TableFull => write!(f, "admission table full"),
            AdmissionDenial::Conflict { owner, kind } => {
                write!(f, "conflicts with {kind:?} held by worker {owner}")
            }
        }
    }
}

/// Result of an operation body that ran under admission (or the cancel short-circuit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Available { resource: ResourceId, seats: Seats },
    Booked(Booking),
    BookingRejected {
        resource: ResourceId,
        requested: Seats,
        available: Seats,
    },
    Cancelled(Booking),
    /// The worker had no bookings; the admission table was never touched.
    NothingToCancel,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Available { .. } => "available",
            Outcome::Booked(_) => "booked",
            Outcome::BookingRejected { .. } => "booking_rejected",
            Outcome::Cancelled(_) => "cancelled",
            Outcome::NothingToCancel => "nothing_to_cancel",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Available { resource, seats } => {
                write!(f, "resource {resource}: {seats} seats available")
            }
            Outcome::Booked(b) => {
                write!(f, "booked {} seats on resource {} (booking {})", b.seats, b.resource, b.id)
            }
            Outcome::BookingRejected {
                resource,
                requested,
                available,
            } => write!(
                f,
                "booking rejected on resource {resource}: requested {requested}, available {available}"
            ),
            Outcome::Cancelled(b) => write!(
                f,
                "cancelled booking {} ({} seats on resource {})",
                b.id, b.seats, b.resource
            ),
            Outcome::NothingToCancel => write!(f, "no bookings to cancel"),
        }
    }
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Completed(Outcome),
    /// Retry budget exhausted before admission. Nothing was mutated.
    TimedOut { attempts: u32 },
}

/// Lifecycle phase reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Requested(Request),
    Waiting {
        attempt: u32,
        backoff: Duration,
        denial: AdmissionDenial,
    },
    Admitted { slot: usize },
    Completed(Outcome),
    TimedOut { attempts: u32 },
}

/// One lifecycle event, tagged with the worker and its per-worker sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub worker: WorkerId,
    pub seq: u64,
    pub phase: Phase,
}
