//! # Scram: bounded shutdown.
//!
//! When a context with a budget is destroyed, an escalator task is armed with a
//! deadline of `now + budget`. [`Context::progress`](crate::Context::progress)
//! moves the deadline out by another budget.
//!
//! If the deadline passes before the context completes, the escalator scrams it:
//! - the context is marked as scramming so ordinary completion is suppressed,
//! - the waiting set is snapshotted,
//! - every live child is scrammed first (depth-first),
//! - the context completes with `ContextError::Scrammed` carrying the snapshot
//!   and every error recorded so far.
//!
//! Operations still running after a scram are abandoned, not cancelled; their
//! late settlements are ignored.
//!
//! The escalator holds only a weak reference and exits when its token is
//! cancelled (on completion) or the context is dropped.

use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::context::{Inner, State};
use crate::events::{Event, EventKind};

impl Inner {
    /// Arms the escalator for a context that has just been destroyed.
    pub(crate) fn arm_scram(self: &Arc<Self>, st: &mut State) {
        let Some(budget) = self.config.scram_budget() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(context = %self.label, "no tokio runtime; scram escalator not armed");
            return;
        };
        let token = CancellationToken::new();
        st.deadline = Some(Instant::now() + budget);
        st.escalator = Some(token.clone());
        self.publish(Event::new(EventKind::ScramArmed).with_budget(budget));
        handle.spawn(escalate(Arc::downgrade(self), token));
    }

    /// Forcibly completes this context and its subtree.
    pub(crate) fn scram(self: &Arc<Self>) {
        let (children, waiting) = {
            let mut st = self.state.lock();
            if st.completed || st.scramming {
                return;
            }
            st.scramming = true;
            let children: Vec<Arc<Inner>> = st.children.values().cloned().collect();
            (children, st.waiting.snapshot())
        };

        for child in children {
            child.scram();
        }

        let outcome = {
            let mut st = self.state.lock();
            if st.completed {
                return;
            }
            self.freeze(&mut st, Some(waiting))
        };
        self.resolve(outcome);
    }
}

async fn escalate(context: Weak<Inner>, token: CancellationToken) {
    loop {
        let deadline = {
            let Some(inner) = context.upgrade() else {
                return;
            };
            let st = inner.state.lock();
            match st.deadline {
                Some(deadline) if !st.completed => deadline,
                _ => return,
            }
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = time::sleep_until(deadline) => {}
        }

        let Some(inner) = context.upgrade() else {
            return;
        };
        let expired = inner
            .state
            .lock()
            .deadline
            .is_some_and(|deadline| deadline <= Instant::now());
        if expired {
            inner.scram();
            return;
        }
    }
}
