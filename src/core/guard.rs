//! # Guarded invocations.
//!
//! [`Context::durable`] and [`Context::ephemeral`] register an operation in the
//! waiting set, spawn it, and settle its outcome into the context when it
//! finishes. The `_sync` variants run a closure in place and settle immediately.
//!
//! All four are rejected with [`ContextError::Destroyed`] once the context has
//! been destroyed; nothing is registered or run in that case.
//!
//! A panicking operation is settled as [`ContextError::Panicked`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use super::context::{Context, Inner, Outcome};
use super::waiting::{OperationRecord, RecordId};
use crate::error::{ContextError, Durability};
use crate::events::{Event, EventKind};
use crate::label::Label;

impl Inner {
    /// Registers an operation unless the context is destroyed.
    pub(crate) fn admit(&self, label: &Label, kind: Durability) -> Option<RecordId> {
        let mut st = self.state.lock();
        if st.destroyed {
            return None;
        }
        let id = RecordId::next();
        st.waiting.insert(
            id,
            OperationRecord {
                label: label.clone(),
                kind,
            },
        );
        self.publish(
            Event::new(EventKind::OperationStarted)
                .with_label(label.clone())
                .with_reason(kind.as_label()),
        );
        Some(id)
    }

    /// Like `admit`, but reports a rejection.
    pub(crate) fn register(
        &self,
        label: &Label,
        kind: Durability,
    ) -> Result<RecordId, ContextError> {
        self.admit(label, kind).ok_or_else(|| {
            self.publish(Event::new(EventKind::OperationRejected).with_label(label.clone()));
            ContextError::Destroyed {
                context: self.label.clone(),
            }
        })
    }
}

fn encode<T: Serialize>(value: T) -> Outcome {
    serde_json::to_value(value).map_err(ContextError::operation)
}

fn run_sync<F, T>(operation: F) -> Result<T, ContextError>
where
    F: FnOnce() -> Result<T, ContextError>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(panic) => Err(ContextError::panicked(panic)),
    }
}

impl Context {
    /// Supervises a durable operation.
    ///
    /// The operation is expected to run until the context is destroyed. When it
    /// finishes after destruction, its value is written into the result mapping
    /// under `label`. Finishing earlier is recorded as [`ContextError::Durable`]
    /// and destroys the context. Failing records the error and destroys the context.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if the context is already destroyed.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn durable<F, T>(&self, label: impl Into<Label>, operation: F) -> Result<(), ContextError>
    where
        F: Future<Output = Result<T, ContextError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.supervise(label.into(), Durability::Durable, async move {
            encode(operation.await?)
        })
    }

    /// Supervises an ephemeral operation.
    ///
    /// Success is ignored. Failing records the error and destroys the context.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if the context is already destroyed.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn ephemeral<F, T>(&self, label: impl Into<Label>, operation: F) -> Result<(), ContextError>
    where
        F: Future<Output = Result<T, ContextError>> + Send + 'static,
        T: Send + 'static,
    {
        self.supervise(label.into(), Durability::Ephemeral, async move {
            operation.await.map(|_| Value::Null)
        })
    }

    /// Runs a durable operation in place and settles it immediately.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if the context is already destroyed.
    pub fn durable_sync<F, T>(
        &self,
        label: impl Into<Label>,
        operation: F,
    ) -> Result<(), ContextError>
    where
        F: FnOnce() -> Result<T, ContextError>,
        T: Serialize,
    {
        let id = self.inner.register(&label.into(), Durability::Durable)?;
        let result = run_sync(operation).and_then(encode);
        self.inner.settle(id, result);
        Ok(())
    }

    /// Runs an ephemeral operation in place and settles it immediately.
    ///
    /// # Errors
    /// Returns [`ContextError::Destroyed`] if the context is already destroyed.
    pub fn ephemeral_sync<F, T>(
        &self,
        label: impl Into<Label>,
        operation: F,
    ) -> Result<(), ContextError>
    where
        F: FnOnce() -> Result<T, ContextError>,
    {
        let id = self.inner.register(&label.into(), Durability::Ephemeral)?;
        let result = run_sync(operation).map(|_| Value::Null);
        self.inner.settle(id, result);
        Ok(())
    }

    fn supervise<F>(&self, label: Label, kind: Durability, operation: F) -> Result<(), ContextError>
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let id = self.inner.register(&label, kind)?;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(ContextError::panicked(panic)),
            };
            inner.settle(id, result);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_durable_exit_before_destroy_fails_context() {
        let ctx = Context::new("main");
        ctx.durable("loop", async { Ok("done") }).unwrap();
        ctx.ephemeral("warmup", async { Ok(()) }).unwrap();

        let err = ctx.completion().await.unwrap_err();
        assert!(ctx.is_destroyed());
        assert_eq!(err.errors()[0].label.to_string(), "loop");
        assert_eq!(err.errors()[0].error.code(), "DURABLE");
    }

    #[tokio::test]
    async fn test_durable_after_destroy_records_result() {
        let ctx = Context::new("main");
        let (tx, rx) = tokio::sync::oneshot::channel::<u16>();
        ctx.durable(["server", "port"], async move {
            rx.await.map_err(ContextError::operation)
        })
        .unwrap();
        ctx.destroy();
        tx.send(8080).unwrap();

        let value = ctx.completion().await.unwrap();
        assert_eq!(value, json!({ "server": { "port": 8080 } }));
    }

    #[tokio::test]
    async fn test_rejected_after_destroy() {
        let ctx = Context::new("main");
        ctx.destroy();
        let err = ctx.ephemeral("late", async { Ok(()) }).unwrap_err();
        assert_eq!(err.code(), "DESTROYED");
        let err = ctx.durable_sync("late", || Ok(1)).unwrap_err();
        assert_eq!(err.code(), "DESTROYED");
        assert_eq!(ctx.completion().await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_ephemeral_failure_destroys_context() {
        let ctx = Context::new("main");
        ctx.ephemeral("job", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err::<(), _>(ContextError::msg("job failed"))
        })
        .unwrap();

        let err = ctx.completion().await.unwrap_err();
        assert!(ctx.is_destroyed());
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.errors()[0].label.to_string(), "job");
        assert_eq!(err.errors()[0].error.to_string(), "job failed");
    }

    #[tokio::test]
    async fn test_sync_variants_settle_in_place() {
        let ctx = Context::new("main");
        ctx.ephemeral_sync("ok", || Ok(())).unwrap();
        assert!(ctx.waiting().is_empty());
        assert!(!ctx.is_destroyed());

        ctx.ephemeral_sync("boom", || -> Result<(), ContextError> { panic!("boom") })
            .unwrap();
        assert!(ctx.is_destroyed());
        let err = ctx.completion().await.unwrap_err();
        assert!(err.contains_code("PANICKED"));
    }
}
