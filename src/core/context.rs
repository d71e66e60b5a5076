//! # Context: the lifecycle state machine.
//!
//! A [`Context`] supervises a set of in-flight operations and child contexts.
//! It moves through these states and never goes back:
//!
//! ```text
//! active ──destroy()──► destroying ──cleanups done──► draining ──► completed
//!   │                      │                            │
//!   │ accepts durable/     │ rejects new guarded        │ waits for: waiting set empty,
//!   │ ephemeral/children   │ invocations (DESTROYED)    │ holds ≤ 0 (bounded by scram)
//! ```
//!
//! ## Completion rule
//! The completion future resolves exactly once, when all of these hold:
//! - the context is destroyed,
//! - no cleanup pass is running,
//! - the waiting set is empty,
//! - the hold count is not positive.
//!
//! The outcome is frozen at that moment:
//! - no errors → `Ok(results)` (the nested result mapping, `{}` if nothing was recorded)
//! - errors → `Err(ContextError::Errored { errors, .. })`
//! - forced by the scram escalator → `Err(ContextError::Scrammed { errors, waiting, .. })`
//!
//! ## Locking
//! All bookkeeping of one context lives behind one mutex. The lock is never held
//! while calling into another context or into a user callback; every cross-context
//! step (cleanups, child settlement, scram fan-out) runs after it is released.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::builder::ContextBuilder;
use super::cleanup::{self, Cleanup, CleanupId, CleanupRegistry};
use super::config::ContextConfig;
use super::waiting::{RecordId, WaitingSet};
use crate::error::{ContextError, Durability, Recorded, Waiting};
use crate::events::{Bus, Event, EventKind};
use crate::label::Label;

/// Terminal value of a context: the result mapping, or the aggregated failure.
pub type Outcome = Result<Value, ContextError>;

static CONTEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique context identity (diagnostics only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        ContextId(CONTEXT_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Back-reference from a child to the parent record it occupies.
pub(crate) struct ParentLink {
    pub(crate) parent: Weak<Inner>,
    /// The child's record in the parent's waiting set.
    pub(crate) record: RecordId,
    /// The parent's cleanup that destroys this child.
    pub(crate) down: CleanupId,
}

/// Mutable bookkeeping, serialized by `Inner::state`.
#[derive(Default)]
pub(crate) struct State {
    pub(crate) destroyed: bool,
    pub(crate) completed: bool,
    pub(crate) scramming: bool,
    /// Cleanup passes in progress; completion waits for them.
    pub(crate) unwinding: usize,
    pub(crate) holds: i64,
    pub(crate) waiting: WaitingSet,
    pub(crate) errors: Vec<Recorded>,
    pub(crate) results: Map<String, Value>,
    pub(crate) cleanups: CleanupRegistry,
    pub(crate) children: BTreeMap<ContextId, Arc<Inner>>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) escalator: Option<CancellationToken>,
}

pub(crate) struct Inner {
    pub(crate) id: ContextId,
    pub(crate) label: Label,
    pub(crate) config: ContextConfig,
    pub(crate) bus: Bus,
    pub(crate) state: Mutex<State>,
    outcome: watch::Sender<Option<Outcome>>,
    /// Bumped on every waiting-set removal and on completion; wakes `drain`.
    settled: watch::Sender<u64>,
    pub(crate) parent: Option<ParentLink>,
    /// Stops the subscriber listener of a root context.
    listener: Option<CancellationToken>,
}

impl Inner {
    pub(crate) fn new(
        label: Label,
        config: ContextConfig,
        bus: Bus,
        parent: Option<ParentLink>,
        listener: Option<CancellationToken>,
    ) -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        let (settled, _) = watch::channel(0);
        Arc::new(Self {
            id: ContextId::next(),
            label,
            config,
            bus,
            state: Mutex::new(State::default()),
            outcome,
            settled,
            parent,
            listener,
        })
    }

    pub(crate) fn publish(&self, event: Event) {
        self.bus.publish(event.with_context(self.label.clone()));
    }

    fn push_error(&self, st: &mut State, error: Recorded) {
        if st.completed {
            warn!(
                context = %self.label,
                label = %error.label,
                error = %error.error,
                "error arrived after completion; dropped"
            );
            return;
        }
        st.errors.push(error);
    }

    /// Flips the destroyed flag; returns the cleanups to run if this call did.
    pub(crate) fn begin_destroy(
        self: &Arc<Self>,
        st: &mut State,
    ) -> Option<Vec<(CleanupId, Cleanup)>> {
        if st.destroyed {
            return None;
        }
        st.destroyed = true;
        st.unwinding += 1;
        self.publish(Event::new(EventKind::ContextDestroyed));
        self.arm_scram(st);
        Some(st.cleanups.drain())
    }

    /// Runs a cleanup pass started by `begin_destroy`, then evaluates completion.
    pub(crate) fn finish_destroy(self: &Arc<Self>, cleanups: Vec<(CleanupId, Cleanup)>) {
        for (_, cleanup) in cleanups {
            self.run_cleanup(cleanup);
        }
        self.state.lock().unwinding -= 1;
        self.check_completion();
    }

    /// Runs one cleanup now and records its failure.
    pub(crate) fn run_cleanup(&self, cleanup: Cleanup) {
        if let Err(error) = cleanup::run(cleanup) {
            self.publish(Event::new(EventKind::CleanupFailed).with_reason(error.to_string()));
            let mut st = self.state.lock();
            self.push_error(&mut st, Recorded::new(self.label.clone(), error));
        }
    }

    pub(crate) fn destroy(self: &Arc<Self>, error: Option<Recorded>) {
        let cleanups = {
            let mut st = self.state.lock();
            if let Some(error) = error {
                self.publish(
                    Event::new(EventKind::OperationFailed)
                        .with_label(error.label.clone())
                        .with_reason(error.error.to_string()),
                );
                self.push_error(&mut st, error);
            }
            self.begin_destroy(&mut st)
        };
        if let Some(cleanups) = cleanups {
            self.finish_destroy(cleanups);
        }
    }

    /// Removes a settled record and applies its outcome.
    ///
    /// | kind      | outcome | context            | effect                          |
    /// |-----------|---------|--------------------|---------------------------------|
    /// | any       | `Err`   | any                | record error, destroy           |
    /// | durable   | `Ok`    | destroyed          | write value at the label path   |
    /// | durable   | `Ok`    | not destroyed      | record `DURABLE`, destroy       |
    /// | ephemeral | `Ok`    | any                | nothing                         |
    pub(crate) fn settle(self: &Arc<Self>, id: RecordId, result: Outcome) {
        let cleanups = {
            let mut st = self.state.lock();
            if st.completed {
                debug!(context = %self.label, "settlement after completion ignored");
                return;
            }
            let Some(record) = st.waiting.remove(id) else {
                return;
            };
            let failure = match (record.kind, result) {
                (_, Err(error)) => {
                    self.publish(
                        Event::new(EventKind::OperationFailed)
                            .with_label(record.label.clone())
                            .with_reason(error.to_string()),
                    );
                    Some(error)
                }
                (Durability::Durable, Ok(value)) if st.destroyed => {
                    record.label.insert_into(&mut st.results, value);
                    None
                }
                (Durability::Durable, Ok(_)) => {
                    self.publish(
                        Event::new(EventKind::DurableExited).with_label(record.label.clone()),
                    );
                    Some(ContextError::Durable {
                        context: self.label.clone(),
                        label: record.label.clone(),
                    })
                }
                (Durability::Ephemeral, Ok(_)) => None,
            };
            match failure {
                Some(error) => {
                    st.errors.push(Recorded::new(record.label, error));
                    self.begin_destroy(&mut st)
                }
                None => None,
            }
        };
        self.settled.send_modify(|n| *n = n.wrapping_add(1));
        match cleanups {
            Some(cleanups) => self.finish_destroy(cleanups),
            None => self.check_completion(),
        }
    }

    pub(crate) fn check_completion(self: &Arc<Self>) {
        let outcome = {
            let mut st = self.state.lock();
            if st.completed
                || st.scramming
                || !st.destroyed
                || st.unwinding > 0
                || st.holds > 0
                || !st.waiting.is_empty()
            {
                return;
            }
            self.freeze(&mut st, None)
        };
        self.resolve(outcome);
    }

    /// Marks the context completed and builds its frozen outcome.
    pub(crate) fn freeze(&self, st: &mut State, scrammed: Option<Vec<Waiting>>) -> Outcome {
        st.completed = true;
        st.deadline = None;
        if let Some(escalator) = st.escalator.take() {
            escalator.cancel();
        }
        let errors = st.errors.clone();
        match scrammed {
            Some(waiting) => Err(ContextError::Scrammed {
                context: self.label.clone(),
                budget: self.config.budget,
                errors,
                waiting,
            }),
            None if errors.is_empty() => Ok(Value::Object(st.results.clone())),
            None => Err(ContextError::Errored {
                context: self.label.clone(),
                errors,
                waiting: Vec::new(),
            }),
        }
    }

    /// Publishes a frozen outcome and reports it to the parent.
    pub(crate) fn resolve(self: &Arc<Self>, outcome: Outcome) {
        let mut event = Event::new(EventKind::ContextCompleted);
        if let Err(error) = &outcome {
            if let ContextError::Scrammed { waiting, .. } = error {
                let waiting: Vec<String> = waiting.iter().map(ToString::to_string).collect();
                self.publish(
                    Event::new(EventKind::Scrammed)
                        .with_reason(format!("[{}]", waiting.join(", ")))
                        .with_budget(self.config.budget),
                );
            }
            event = event.with_reason(error.to_string());
        }
        self.publish(event);

        self.outcome.send_replace(Some(outcome.clone()));
        self.settled.send_modify(|n| *n = n.wrapping_add(1));
        if let Some(listener) = &self.listener {
            listener.cancel();
        }
        if let Some(link) = &self.parent {
            if let Some(parent) = link.parent.upgrade() {
                parent.child_settled(self.id, link, outcome);
            }
        }
    }

    fn progress(&self) {
        let Some(budget) = self.config.scram_budget() else {
            return;
        };
        let mut st = self.state.lock();
        if !st.destroyed || st.completed || st.deadline.is_none() {
            return;
        }
        st.deadline = Some(Instant::now() + budget);
        self.publish(Event::new(EventKind::ProgressReported).with_budget(budget));
    }

    pub(crate) fn cancel_cleanup(&self, id: CleanupId) -> bool {
        self.state.lock().cleanups.take(id).is_some()
    }

    /// Registers a cleanup, or runs it right away when already destroyed.
    pub(crate) fn add_cleanup(&self, id: CleanupId, cleanup: Cleanup) {
        let immediate = {
            let mut st = self.state.lock();
            if st.destroyed {
                Some(cleanup)
            } else {
                st.cleanups.insert(id, cleanup);
                None
            }
        };
        if let Some(cleanup) = immediate {
            self.run_cleanup(cleanup);
        }
    }
}

/// Handle to one node of the lifecycle tree.
///
/// Cheap to clone; every clone refers to the same context.
///
/// # Example
/// ```rust
/// use ctxvisor::{Context, ContextError};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let ctx = Context::new("main");
///     let (tx, rx) = tokio::sync::oneshot::channel();
///     ctx.durable("answer", async move { rx.await.map_err(ContextError::operation) })
///         .unwrap();
///     ctx.destroy();
///     tx.send(42).unwrap();
///
///     // Finishing after destroy() is the expected path for a durable operation.
///     assert_eq!(ctx.completion().await.unwrap(), json!({ "answer": 42 }));
/// }
/// ```
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<Inner>,
}

impl Context {
    /// Creates a root context with the default configuration (1s budget).
    pub fn new(label: impl Into<Label>) -> Self {
        ContextBuilder::new(label).build()
    }

    /// Creates a root context with the given shutdown budget (`0s` = unbounded).
    pub fn with_budget(label: impl Into<Label>, budget: Duration) -> Self {
        ContextBuilder::new(label).budget(budget).build()
    }

    /// Returns a builder for a root context.
    pub fn builder(label: impl Into<Label>) -> ContextBuilder {
        ContextBuilder::new(label)
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Process-wide unique identity.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Label this context was created with.
    pub fn label(&self) -> &Label {
        &self.inner.label
    }

    /// Shutdown budget (`None` = unbounded).
    pub fn budget(&self) -> Option<Duration> {
        self.inner.config.scram_budget()
    }

    /// True once the context entered the destroying state (never resets).
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// True once the completion future has resolved.
    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().completed
    }

    /// True if at least one error has been recorded.
    pub fn errored(&self) -> bool {
        !self.inner.state.lock().errors.is_empty()
    }

    /// Operations and children currently in flight, in registration order.
    pub fn waiting(&self) -> Vec<Waiting> {
        self.inner.state.lock().waiting.snapshot()
    }

    /// Current hold count.
    pub fn holds(&self) -> i64 {
        self.inner.state.lock().holds
    }

    /// Number of live child contexts.
    pub fn children(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    /// Subscribes to the events of this context's tree.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Destroys the context. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy(None);
    }

    /// Records `error` against this context and destroys it.
    ///
    /// Later calls only append their error.
    pub fn destroy_with(&self, error: impl Into<ContextError>) {
        self.inner
            .destroy(Some(Recorded::new(self.inner.label.clone(), error)));
    }

    /// Destroys the context once `delay` elapses, unless it is destroyed sooner.
    ///
    /// Passing the returned id to [`invoke_cleanup`](Self::invoke_cleanup)
    /// abandons the timer.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn destroy_after(&self, delay: Duration) -> CleanupId {
        let abandon = CancellationToken::new();
        let timer = abandon.clone();
        let id = self.destruct(move || {
            abandon.cancel();
            Ok(())
        });
        let context = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = context.upgrade() {
                        inner.destroy(None);
                    }
                }
            }
        });
        id
    }

    /// Registers a cleanup to run when the context is destroyed.
    ///
    /// Cleanups run once, in registration order. A cleanup registered after
    /// destruction runs immediately. A failing cleanup is recorded as an error.
    pub fn destruct<F>(&self, cleanup: F) -> CleanupId
    where
        F: FnOnce() -> Result<(), ContextError> + Send + 'static,
    {
        let id = CleanupId::next();
        self.inner.add_cleanup(id, Box::new(cleanup));
        id
    }

    /// Cancels a pending cleanup. Returns `false` if it already ran or was cancelled.
    pub fn cancel_cleanup(&self, id: CleanupId) -> bool {
        self.inner.cancel_cleanup(id)
    }

    /// Runs a pending cleanup now, out of band. Returns `false` if it is not pending.
    pub fn invoke_cleanup(&self, id: CleanupId) -> bool {
        let cleanup = self.inner.state.lock().cleanups.take(id);
        match cleanup {
            Some(cleanup) => {
                self.inner.run_cleanup(cleanup);
                true
            }
            None => false,
        }
    }

    /// Sets `flag` to `true` when the context is destroyed.
    pub fn mark_destroyed(&self, flag: Arc<AtomicBool>) -> CleanupId {
        self.destruct(move || {
            flag.store(true, AtomicOrdering::SeqCst);
            Ok(())
        })
    }

    /// Adds a hold; completion waits while the hold count is positive.
    pub fn increment(&self) {
        self.inner.state.lock().holds += 1;
    }

    /// Releases a hold and re-evaluates completion.
    pub fn decrement(&self) {
        self.inner.state.lock().holds -= 1;
        self.inner.check_completion();
    }

    /// Pushes the scram deadline out by one budget. No-op before destruction.
    ///
    /// Ancestors wait on this context, so their deadlines move too.
    pub fn progress(&self) {
        let mut next = Some(Arc::clone(&self.inner));
        while let Some(inner) = next {
            inner.progress();
            next = inner.parent.as_ref().and_then(|link| link.parent.upgrade());
        }
    }

    /// Waits until every operation in flight right now has settled.
    ///
    /// Operations registered after the call are ignored. Also returns when the
    /// context completes (including by scram).
    pub async fn drain(&self) {
        let mut settled = self.inner.settled.subscribe();
        let snapshot = self.inner.state.lock().waiting.ids();
        loop {
            {
                let st = self.inner.state.lock();
                if st.completed || snapshot.iter().all(|id| !st.waiting.contains(*id)) {
                    return;
                }
            }
            if settled.changed().await.is_err() {
                return;
            }
        }
    }

    /// Waits for the terminal outcome. May be awaited any number of times.
    pub async fn completion(&self) -> Outcome {
        let mut rx = self.inner.outcome.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Err(ContextError::Destroyed {
                    context: self.inner.label.clone(),
                });
            }
        }
    }

    /// The terminal outcome, if already resolved.
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.inner.outcome.borrow().clone()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .finish_non_exhaustive()
    }
}
