//! # Runtime events emitted by contexts.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Tree events**: contexts and children being created
//! - **Operation events**: guarded invocations starting, failing, being rejected
//! - **Shutdown events**: destruction, cleanups, scram escalation and completion
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! context and operation labels, reasons, and budgets.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use ctxvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::OperationFailed)
//!     .with_context("main")
//!     .with_label("listener")
//!     .with_reason("bind failed")
//!     .with_budget(Duration::from_millis(250));
//!
//! assert_eq!(ev.kind, EventKind::OperationFailed);
//! assert_eq!(ev.label.as_deref(), Some("listener"));
//! assert_eq!(ev.budget_ms, Some(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `label`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `label`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Tree events ===
    /// A root context was built.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `budget_ms`: scram budget (absent when unbounded)
    ContextCreated,

    /// A child context was attached to its parent.
    ///
    /// Sets:
    /// - `context`: parent label
    /// - `label`: child label
    /// - `reason`: `durable` or `ephemeral`
    ChildSpawned,

    // === Operation events ===
    /// A guarded invocation was registered in the waiting set.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `label`: operation label
    /// - `reason`: `durable` or `ephemeral`
    OperationStarted,

    /// A guarded invocation was rejected because the context is destroyed.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `label`: operation label
    OperationRejected,

    /// A supervised operation settled with an error.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `label`: operation label
    /// - `reason`: error message
    OperationFailed,

    /// A durable operation finished before its context was destroyed.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `label`: operation label
    DurableExited,

    // === Shutdown events ===
    /// The context was marked destroyed (cleanups are about to run).
    ///
    /// Sets:
    /// - `context`: context label
    ContextDestroyed,

    /// A cleanup callback failed or panicked.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `reason`: error message
    CleanupFailed,

    /// The scram escalator was armed.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `budget_ms`: scram budget
    ScramArmed,

    /// An operation reported progress; the scram deadline moved.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `budget_ms`: scram budget
    ProgressReported,

    /// The budget elapsed; the context was forcibly completed.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `reason`: waiting snapshot
    Scrammed,

    /// The completion future resolved.
    ///
    /// Sets:
    /// - `context`: context label
    /// - `reason`: error message (absent on success)
    ContextCompleted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Label of the context the event concerns.
    pub context: Option<Arc<str>>,
    /// Label of the operation, child or subscriber the event concerns.
    pub label: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Scram budget in milliseconds (compact).
    pub budget_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            context: None,
            label: None,
            reason: None,
            budget_ms: None,
        }
    }

    /// Attaches the context label.
    #[inline]
    pub fn with_context(mut self, context: impl Into<Arc<str>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attaches an operation label.
    #[inline]
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a budget (stored as milliseconds).
    #[inline]
    pub fn with_budget(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.budget_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_label(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_label(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ContextCreated);
        let b = Event::new(EventKind::ContextCreated);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_budget_saturates() {
        let ev = Event::new(EventKind::ScramArmed).with_budget(Duration::from_secs(u64::MAX));
        assert_eq!(ev.budget_ms, Some(u32::MAX));
    }
}
