//! # Child contexts.
//!
//! A child occupies one record in its parent's waiting set until it completes;
//! its outcome is then settled into the parent like any other operation.
//!
//! ```text
//!            parent
//!   down: parent destroyed ──► child destroyed      (every child)
//!   up:   child destroyed  ──► parent destroyed     (durable children only)
//! ```
//!
//! Both hooks are ordinary cleanups holding weak references, so neither side
//! keeps the other alive. Each hook cancels its counterpart before firing, and
//! the parent cancels its `down` hook once the child completes.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use super::cleanup::{Cleanup, CleanupId};
use super::config::ContextConfig;
use super::context::{Context, ContextId, Inner, Outcome, ParentLink};
use super::waiting::{OperationRecord, RecordId};
use crate::error::{ContextError, Durability};
use crate::events::{Event, EventKind};
use crate::label::Label;

impl Inner {
    /// Detaches a completed child and settles its record.
    pub(crate) fn child_settled(
        self: &Arc<Self>,
        child: ContextId,
        link: &ParentLink,
        outcome: Outcome,
    ) {
        let detached = {
            let mut st = self.state.lock();
            let _ = st.cleanups.take(link.down);
            st.children.remove(&child)
        };
        drop(detached);
        self.settle(link.record, outcome);
    }
}

impl Context {
    /// Creates a durable child context.
    ///
    /// The parent cannot complete before the child does, destroying the parent
    /// destroys the child, and destroying the child destroys the parent. The
    /// child's result mapping is written into the parent's results under `label`.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if this context is already destroyed.
    pub fn durable_child(&self, label: impl Into<Label>) -> Result<Context, ContextError> {
        self.attach(label.into(), Durability::Durable, self.inner.config.clone())
    }

    /// Like [`durable_child`](Self::durable_child) with its own shutdown budget.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if this context is already destroyed.
    pub fn durable_child_with(
        &self,
        label: impl Into<Label>,
        budget: Duration,
    ) -> Result<Context, ContextError> {
        let config = ContextConfig {
            budget,
            ..self.inner.config.clone()
        };
        self.attach(label.into(), Durability::Durable, config)
    }

    /// Creates an ephemeral child context.
    ///
    /// Destroying the parent destroys the child; the child may be destroyed and
    /// complete on its own without affecting the parent (unless it fails).
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if this context is already destroyed.
    pub fn ephemeral_child(&self, label: impl Into<Label>) -> Result<Context, ContextError> {
        self.attach(label.into(), Durability::Ephemeral, self.inner.config.clone())
    }

    /// Like [`ephemeral_child`](Self::ephemeral_child) with its own shutdown budget.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if this context is already destroyed.
    pub fn ephemeral_child_with(
        &self,
        label: impl Into<Label>,
        budget: Duration,
    ) -> Result<Context, ContextError> {
        let config = ContextConfig {
            budget,
            ..self.inner.config.clone()
        };
        self.attach(label.into(), Durability::Ephemeral, config)
    }

    /// Creates an ephemeral child and runs `init` against it.
    ///
    /// If `init` fails (or panics) the child is destroyed with that error and the
    /// error is returned; the parent then fails too once the child completes.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if this context is already destroyed,
    /// or the error produced by `init`.
    pub async fn ephemeral_with<F, Fut, T>(
        &self,
        label: impl Into<Label>,
        init: F,
    ) -> Result<T, ContextError>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, ContextError>>,
    {
        let child = self.ephemeral_child(label)?;
        let result = match AssertUnwindSafe(init(child.clone())).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ContextError::panicked(panic)),
        };
        if let Err(error) = &result {
            child.destroy_with(error.clone());
        }
        result
    }

    fn attach(
        &self,
        label: Label,
        kind: Durability,
        config: ContextConfig,
    ) -> Result<Context, ContextError> {
        let parent = &self.inner;
        let record = RecordId::next();
        let down = CleanupId::next();
        let link = ParentLink {
            parent: Arc::downgrade(parent),
            record,
            down,
        };
        let child = Inner::new(label.clone(), config, parent.bus.clone(), Some(link), None);

        let weak_child = Arc::downgrade(&child);
        let up = CleanupId::next();
        let destroy_child: Cleanup = Box::new(move || {
            if let Some(child) = weak_child.upgrade() {
                child.cancel_cleanup(up);
                child.destroy(None);
            }
            Ok(())
        });

        {
            let mut st = parent.state.lock();
            if st.destroyed {
                parent.publish(Event::new(EventKind::OperationRejected).with_label(label));
                return Err(ContextError::Destroyed {
                    context: parent.label.clone(),
                });
            }
            st.waiting.insert(
                record,
                OperationRecord {
                    label: label.clone(),
                    kind,
                },
            );
            st.children.insert(child.id, Arc::clone(&child));
            st.cleanups.insert(down, destroy_child);
        }
        parent.publish(
            Event::new(EventKind::ChildSpawned)
                .with_label(label)
                .with_reason(kind.as_label()),
        );

        if kind == Durability::Durable {
            let weak_parent = Arc::downgrade(parent);
            let destroy_parent: Cleanup = Box::new(move || {
                if let Some(parent) = weak_parent.upgrade() {
                    parent.cancel_cleanup(down);
                    parent.destroy(None);
                }
                Ok(())
            });
            child.add_cleanup(up, destroy_parent);
        }

        Ok(Context::from_inner(child))
    }
}
