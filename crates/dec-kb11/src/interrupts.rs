//! Pending-interrupt queue.
//!
//! Devices queue vectors from their own threads; the CPU drains the queue
//! between instructions. Each priority level holds a *set* of vectors, so
//! a device re-requesting before service collapses into one entry. An
//! atomic "any pending" flag keeps the per-instruction check cheap, and a
//! condvar wakes the execution thread out of WAIT.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use pdp_core::StopFlag;

/// Thread-safe set of pending interrupt vectors per priority level.
#[derive(Debug, Default)]
pub struct InterruptQueue {
    levels: Mutex<[BTreeSet<u8>; 8]>,
    waker: Condvar,
    any_pending: AtomicBool,
}

impl InterruptQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, [BTreeSet<u8>; 8]> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `vector` at `level`. Callable from any thread; duplicates at
    /// the same level collapse.
    pub fn queue(&self, level: u8, vector: u8) {
        let mut levels = self.lock();
        levels[usize::from(level & 7)].insert(vector);
        self.any_pending.store(true, Ordering::SeqCst);
        self.waker.notify_all();
        debug!("queueing interrupt vector {vector:o} at level {level}");
    }

    /// Cheap between-instructions test.
    #[must_use]
    pub fn any_pending(&self) -> bool {
        self.any_pending.load(Ordering::SeqCst)
    }

    /// Take one pending vector above `ipl`, highest level first. Vectors at
    /// or below `ipl` stay queued.
    pub(crate) fn take_above(&self, ipl: u8) -> Option<(u8, u8)> {
        let mut levels = self.lock();

        for level in (ipl + 1..8).rev() {
            let set = &mut levels[usize::from(level)];
            if let Some(&vector) = set.iter().next() {
                set.remove(&vector);
                let empty = levels.iter().all(BTreeSet::is_empty);
                self.any_pending.store(!empty, Ordering::SeqCst);
                return Some((level, vector));
            }
        }

        // nothing deliverable right now; keep the flag hot while masked
        // vectors remain so lowering the IPL rechecks them
        let empty = levels.iter().all(BTreeSet::is_empty);
        self.any_pending.store(!empty, Ordering::SeqCst);
        None
    }

    /// Block until something is queued or a stop is requested (WAIT).
    pub(crate) fn wait_any(&self, stop: &StopFlag) {
        let mut levels = self.lock();
        while levels.iter().all(BTreeSet::is_empty) && !stop.is_raised() {
            let (guard, _) = self
                .waker
                .wait_timeout(levels, Duration::from_millis(10))
                .unwrap_or_else(PoisonError::into_inner);
            levels = guard;
        }
    }

    /// Drop everything (RESET instruction, machine reset).
    pub fn clear(&self) {
        let mut levels = self.lock();
        for set in levels.iter_mut() {
            set.clear();
        }
        self.any_pending.store(false, Ordering::SeqCst);
    }

    /// Number of vectors pending at `level`.
    #[must_use]
    pub fn pending_at(&self, level: u8) -> usize {
        self.lock()[usize::from(level & 7)].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let q = InterruptQueue::new();
        q.queue(4, 0o60);
        q.queue(4, 0o60);
        assert_eq!(q.pending_at(4), 1);
    }

    #[test]
    fn test_delivery_respects_ipl() {
        let q = InterruptQueue::new();
        q.queue(4, 0o60);
        assert!(q.any_pending());

        // masked at IPL 4, stays queued and the flag stays hot
        assert_eq!(q.take_above(4), None);
        assert!(q.any_pending());
        assert_eq!(q.pending_at(4), 1);

        assert_eq!(q.take_above(3), Some((4, 0o60)));
        assert!(!q.any_pending());
    }

    #[test]
    fn test_highest_level_first() {
        let q = InterruptQueue::new();
        q.queue(4, 0o60);
        q.queue(6, 0o100);
        assert_eq!(q.take_above(0), Some((6, 0o100)));
        assert_eq!(q.take_above(0), Some((4, 0o60)));
    }

    #[test]
    fn test_wait_wakes_on_queue() {
        use std::sync::Arc;

        let q = Arc::new(InterruptQueue::new());
        let stop = StopFlag::new();

        let q2 = Arc::clone(&q);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            q2.queue(7, 0o200);
        });

        q.wait_any(&stop);
        assert!(q.any_pending());
        handle.join().expect("queue thread");
    }
}
