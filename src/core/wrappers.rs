//! # Error-handling wrappers.
//!
//! Each wrapper awaits an operation inline, tracking it as an ephemeral record
//! while it runs (so the context does not complete underneath it), and applies
//! a fixed failure policy:
//!
//! | wrapper          | on failure                                              |
//! |------------------|---------------------------------------------------------|
//! | `exceptional`    | destroy; return the error tagged with context and label |
//! | `rescue`         | destroy; return the original error                      |
//! | `destructive`    | destroy; return the error (or a fallback value)         |
//! | `copacetic`      | skip if already errored; destroy; return `None`         |
//!
//! "Destroy" means the error is recorded under the wrapper's label and the
//! context is destroyed, exactly as if a supervised operation had failed.
//!
//! Unlike guarded invocations the wrappers also run on a destroyed context; the
//! operation is then not tracked in the waiting set.
//!
//! Dropping a wrapper future mid-flight settles its record as a success.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use super::context::{Context, Inner, Outcome};
use super::waiting::RecordId;
use crate::error::{ContextError, Durability, Recorded};
use crate::label::Label;

/// Waiting-set record owned by an in-flight wrapper.
struct Pending {
    inner: Arc<Inner>,
    id: Option<RecordId>,
}

impl Pending {
    fn finish(mut self, result: Outcome) {
        if let Some(id) = self.id.take() {
            self.inner.settle(id, result);
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.inner.settle(id, Ok(Value::Null));
        }
    }
}

impl Context {
    async fn guarded<F, T>(&self, label: &Label, operation: F) -> Result<T, ContextError>
    where
        F: Future<Output = Result<T, ContextError>>,
    {
        let pending = Pending {
            inner: Arc::clone(&self.inner),
            id: self.inner.admit(label, Durability::Ephemeral),
        };
        let result = match AssertUnwindSafe(operation).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ContextError::panicked(panic)),
        };
        match &result {
            Ok(_) => pending.finish(Ok(Value::Null)),
            Err(error) if pending.id.is_some() => pending.finish(Err(error.clone())),
            Err(error) => {
                drop(pending);
                self.inner
                    .destroy(Some(Recorded::new(label.clone(), error.clone())));
            }
        }
        result
    }

    /// Runs `operation`; a failure destroys the context and is returned tagged.
    ///
    /// # Errors
    /// Returns [`ContextError::Errored`] carrying the context label and a single
    /// [`Recorded`] cause under `label`.
    pub async fn exceptional<F, T>(
        &self,
        label: impl Into<Label>,
        operation: F,
    ) -> Result<T, ContextError>
    where
        F: Future<Output = Result<T, ContextError>>,
    {
        let label = label.into();
        self.guarded(&label, operation).await.map_err(|error| ContextError::Errored {
            context: self.inner.label.clone(),
            errors: vec![Recorded::new(label, error)],
            waiting: Vec::new(),
        })
    }

    /// Runs `operation`; a failure destroys the context and is returned unchanged.
    ///
    /// # Errors
    /// Returns the operation's own error.
    pub async fn rescue<F, T>(
        &self,
        label: impl Into<Label>,
        operation: F,
    ) -> Result<T, ContextError>
    where
        F: Future<Output = Result<T, ContextError>>,
    {
        self.guarded(&label.into(), operation).await
    }

    /// Runs `operation` whose failure must bring the context down.
    ///
    /// # Errors
    /// Returns the operation's own error after destroying the context.
    pub async fn destructive<F, T>(
        &self,
        label: impl Into<Label>,
        operation: F,
    ) -> Result<T, ContextError>
    where
        F: Future<Output = Result<T, ContextError>>,
    {
        self.guarded(&label.into(), operation).await
    }

    /// Like [`destructive`](Self::destructive), returning `fallback` on failure.
    pub async fn destructive_or<F, T>(
        &self,
        label: impl Into<Label>,
        fallback: T,
        operation: F,
    ) -> T
    where
        F: Future<Output = Result<T, ContextError>>,
    {
        self.guarded(&label.into(), operation)
            .await
            .unwrap_or(fallback)
    }

    /// Runs `operation` only while the context has recorded no error.
    ///
    /// Returns `None` if the context is already errored (the operation is not
    /// run) or if it fails (the failure destroys the context). Never returns an error.
    pub async fn copacetic<F, T>(&self, label: impl Into<Label>, operation: F) -> Option<T>
    where
        F: Future<Output = Result<T, ContextError>>,
    {
        if self.errored() {
            return None;
        }
        self.guarded(&label.into(), operation).await.ok()
    }

    /// Like [`copacetic`](Self::copacetic), returning `fallback` instead of `None`.
    pub async fn copacetic_or<F, T>(&self, label: impl Into<Label>, fallback: T, operation: F) -> T
    where
        F: Future<Output = Result<T, ContextError>>,
    {
        self.copacetic(label, operation).await.unwrap_or(fallback)
    }
}
