use std::collections::BTreeMap;

use rand::Rng;
use ulid::Ulid;

use crate::model::*;

/// A worker's private list of live bookings. Never shared, so no locking.
#[derive(Debug, Default)]
pub struct BookingLedger {
    bookings: Vec<Booking>,
}

impl BookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn insert(&mut self, booking: Booking) {
        self.bookings.push(booking);
    }

    /// Uniformly random booking, or None if there are none.
    pub fn choose(&self, rng: &mut impl Rng) -> Option<Booking> {
        if self.bookings.is_empty() {
            return None;
        }
        Some(self.bookings[rng.gen_range(0..self.bookings.len())])
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.swap_remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter()
    }

    /// Seats held per resource.
    pub fn seats_by_resource(&self) -> BTreeMap<ResourceId, Seats> {
        let mut out = BTreeMap::new();
        for b in &self.bookings {
            *out.entry(b.resource).or_insert(0) += b.seats;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn booking(resource: ResourceId, seats: Seats) -> Booking {
        Booking {
            id: Ulid::new(),
            resource,
            seats,
        }
    }

    #[test]
    fn choose_from_empty_is_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(BookingLedger::new().choose(&mut rng).is_none());
    }

    #[test]
    fn insert_choose_remove() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ledger = BookingLedger::new();
        let b = booking(1, 5);
        ledger.insert(b);
        assert_eq!(ledger.choose(&mut rng), Some(b));
        assert_eq!(ledger.remove(b.id), Some(b));
        assert!(ledger.is_empty());
        assert_eq!(ledger.remove(b.id), None);
    }

    #[test]
    fn seats_grouped_by_resource() {
        let mut ledger = BookingLedger::new();
        ledger.insert(booking(1, 5));
        ledger.insert(booking(2, 7));
        ledger.insert(booking(1, 6));
        let grouped = ledger.seats_by_resource();
        assert_eq!(grouped.get(&1), Some(&11));
        assert_eq!(grouped.get(&2), Some(&7));
        assert_eq!(ledger.len(), 3);
    }
}
