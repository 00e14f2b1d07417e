use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::WorkerId;

/// Sentinel for "no holder".
const FREE: u64 = u64::MAX;

/// Busy-spin iterations before a waiter starts yielding its time slice.
const SPIN_LIMIT: u32 = 64;

/// FIFO fairness lock with explicit turn passing.
///
/// `acquire` either takes a free lock immediately or appends the caller to the
/// wait queue and spins until `release` hands it the turn. Turns are granted in
/// strict arrival order. Waiting is cooperative (spin, then `yield_now`); the
/// queue itself is bookkeeping touched for a few instructions under a mutex.
/// The data sits behind its own mutex, locked only by the turn holder, so it
/// is never contended.
///
/// Owners are worker ids. An owner may be queued at most once and the lock is
/// not reentrant; violating either panics.
pub struct FairLock<T> {
    /// Current holder, or `FREE`. Written only while `queue` is locked.
    holder: AtomicU64,
    queue: Mutex<VecDeque<WorkerId>>,
    acquisitions: AtomicU64,
    contended: AtomicU64,
    data: Mutex<T>,
}

impl<T> FairLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            holder: AtomicU64::new(FREE),
            queue: Mutex::new(VecDeque::new()),
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            data: Mutex::new(data),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<WorkerId>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock for `owner`, waiting in FIFO order behind earlier callers.
    pub fn acquire(&self, owner: WorkerId) -> FairLockGuard<'_, T> {
        {
            let mut queue = self.queue();
            let holder = self.holder.load(Ordering::Acquire);
            assert_ne!(holder, owner as u64, "fair lock is not reentrant (owner {owner})");
            if holder == FREE {
                debug_assert!(queue.is_empty());
                self.holder.store(owner as u64, Ordering::Release);
                self.acquisitions.fetch_add(1, Ordering::Relaxed);
                drop(queue);
                return self.granted(owner);
            }
            assert!(
                !queue.contains(&owner),
                "owner {owner} is already waiting for the fair lock"
            );
            queue.push_back(owner);
        }

        self.contended.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(crate::observability::FAIR_LOCK_CONTENDED_TOTAL).increment(1);

        let mut spins = 0u32;
        while self.holder.load(Ordering::Acquire) != owner as u64 {
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.granted(owner)
    }

    /// Build the guard for the owner that now holds the turn.
    fn granted(&self, owner: WorkerId) -> FairLockGuard<'_, T> {
        // Take the turn first so a panic while locking `data` still releases it.
        let turn = Turn { lock: self, owner };
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        FairLockGuard { data, _turn: turn }
    }

    /// Hand the turn to the next waiter, or mark the lock free.
    fn release(&self, owner: WorkerId) {
        let mut queue = self.queue();
        let holder = self.holder.load(Ordering::Acquire);
        assert_eq!(
            holder, owner as u64,
            "fair lock released by {owner} but held by {holder}"
        );
        let next = queue.pop_front().map_or(FREE, u64::from);
        self.holder.store(next, Ordering::Release);
    }

    /// Current holder, if any.
    pub fn holder(&self) -> Option<WorkerId> {
        match self.holder.load(Ordering::Acquire) {
            FREE => None,
            id => Some(id as WorkerId),
        }
    }

    /// Owners currently queued, front first.
    pub fn waiting(&self) -> Vec<WorkerId> {
        self.queue().iter().copied().collect()
    }

    /// Total grants so far.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Grants that had to wait in the queue.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }
}

/// Exclusive access to the data behind a [`FairLock`]. Dropping it passes the turn on.
pub struct FairLockGuard<'a, T> {
    // Field order matters: the data lock is released before the turn moves on.
    data: MutexGuard<'a, T>,
    _turn: Turn<'a, T>,
}

/// The holder's turn. Dropping it hands the lock to the next waiter.
struct Turn<'a, T> {
    lock: &'a FairLock<T>,
    owner: WorkerId,
}

impl<T> Drop for Turn<'_, T> {
    fn drop(&mut self) {
        self.lock.release(self.owner);
    }
}

impl<T> Deref for FairLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for FairLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}
