//! # Cleanup registry.
//!
//! Cleanups are zero-argument callbacks run once when their context is destroyed.
//! Each is keyed by a [`CleanupId`] so it can be cancelled, or invoked out of band,
//! before destruction.
//!
//! ## Rules
//! - Cleanups run in registration order.
//! - A cleanup that fails or panics is captured; the remaining cleanups still run.
//! - The registry itself never runs anything; the owning context decides when.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::ContextError;

static CLEANUP_SEQ: AtomicU64 = AtomicU64::new(1);

/// Boxed cleanup callback.
pub type Cleanup = Box<dyn FnOnce() -> Result<(), ContextError> + Send + 'static>;

/// Identity of a registered cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CleanupId(u64);

impl CleanupId {
    pub(crate) fn next() -> Self {
        CleanupId(CLEANUP_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Ordered set of pending cleanups.
#[derive(Default)]
pub(crate) struct CleanupRegistry {
    pending: Vec<(CleanupId, Cleanup)>,
}

impl CleanupRegistry {
    pub(crate) fn insert(&mut self, id: CleanupId, cleanup: Cleanup) {
        self.pending.push((id, cleanup));
    }

    /// Removes the cleanup without running it.
    pub(crate) fn take(&mut self, id: CleanupId) -> Option<Cleanup> {
        let index = self.pending.iter().position(|(pending, _)| *pending == id)?;
        Some(self.pending.remove(index).1)
    }

    /// Removes every pending cleanup, in registration order.
    pub(crate) fn drain(&mut self) -> Vec<(CleanupId, Cleanup)> {
        std::mem::take(&mut self.pending)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Runs one cleanup, converting a panic into an error.
pub(crate) fn run(cleanup: Cleanup) -> Result<(), ContextError> {
    match std::panic::catch_unwind(AssertUnwindSafe(cleanup)) {
        Ok(result) => result,
        Err(panic) => Err(ContextError::panicked(panic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_drain_keeps_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CleanupRegistry::default();
        for n in 0..3 {
            let order = Arc::clone(&order);
            registry.insert(
                CleanupId::next(),
                Box::new(move || {
                    order.lock().push(n);
                    Ok(())
                }),
            );
        }

        for (_, cleanup) in registry.drain() {
            run(cleanup).unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_take_cancels_single_cleanup() {
        let mut registry = CleanupRegistry::default();
        let keep = CleanupId::next();
        let cancel = CleanupId::next();
        registry.insert(keep, Box::new(|| Ok(())));
        registry.insert(cancel, Box::new(|| Err(ContextError::msg("must not run"))));

        assert!(registry.take(cancel).is_some());
        assert!(registry.take(cancel).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_panicking_cleanup_becomes_error() {
        let cleanup: Cleanup = Box::new(|| -> Result<(), ContextError> {
            panic!("cleanup blew up")
        });
        let err = run(cleanup).unwrap_err();
        assert_eq!(err.code(), "PANICKED");
    }
}
