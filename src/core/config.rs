//! # Context configuration.
//!
//! Provides [`ContextConfig`] the settings a root context is built with.
//! Children inherit their parent's configuration unless they are created
//! with an explicit budget override.
//!
//! ## Sentinel values
//! - `budget = 0s` → unbounded (the scram escalator is never armed)

use std::time::Duration;

/// Default shutdown budget applied to new contexts.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(1);

/// Configuration for a context tree.
///
/// ## Field semantics
/// - `budget`: how long a destroyed context may wait for its in-flight operations
///   before it is scrammed (`0s` = unbounded, wait forever)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Maximum time between destruction and completion before forced termination.
    ///
    /// When a context is destroyed:
    /// - The scram escalator is armed with this budget
    /// - `Context::progress` pushes the deadline out by another `budget`
    /// - If the deadline passes, the context completes with `ContextError::Scrammed`
    pub budget: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Shared by every context of one tree. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,
}

impl ContextConfig {
    /// Returns a configuration with the scram escalator disabled.
    pub fn unbounded() -> Self {
        Self {
            budget: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Returns the shutdown budget as an `Option`.
    ///
    /// - `None` → unbounded, never scram
    /// - `Some(d)` → scram `d` after destruction (or after the last progress report)
    #[inline]
    pub fn scram_budget(&self) -> Option<Duration> {
        if self.budget == Duration::ZERO {
            None
        } else {
            Some(self.budget)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ContextConfig {
    /// Default configuration:
    ///
    /// - `budget = 1s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            bus_capacity: 1024,
        }
    }
}
