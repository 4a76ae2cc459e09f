//! Atomic Utilities
//!
//! Spin-waiting on a shared word.

use crossbeam::utils::Backoff;

/// AtomicUtils - utility for atomic operations
pub struct AtomicUtils;

impl AtomicUtils {
    /// Spin on `load` while `condition` holds for the loaded value.
    ///
    /// `load` must read with at least `Acquire` ordering. Backs off between
    /// reads, yielding the thread once spinning stops paying off. Returns
    /// the first value for which `condition` is false, together with the
    /// number of re-reads.
    pub fn spin_wait_while<L, F>(mut load: L, mut condition: F) -> (usize, usize)
    where
        L: FnMut() -> usize,
        F: FnMut(usize) -> bool,
    {
        let backoff = Backoff::new();
        let mut reads = 0;

        loop {
            let value = load();
            if !condition(value) {
                return (value, reads);
            }
            reads += 1;
            backoff.snooze();
        }
    }
}
