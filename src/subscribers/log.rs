//! # LogWriter: tracing-backed event printer
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see them.
//!
//! ## Example output
//! ```text
//! INFO  ctxvisor: [created] context="main" budget_ms=1000
//! INFO  ctxvisor: [destroyed] context="main"
//! WARN  ctxvisor: [failed] context="main" label="listener" err="bind failed"
//! ERROR ctxvisor: [scrammed] context="main" waiting="[stuck(durable)]"
//! INFO  ctxvisor: [completed] context="main"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let context = e.context.as_deref().unwrap_or("-");
        let label = e.label.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ContextCreated => {
                info!(context, budget_ms = ?e.budget_ms, "[created]");
            }
            EventKind::ChildSpawned => {
                debug!(context, child = label, kind = reason, "[child]");
            }
            EventKind::OperationStarted => {
                debug!(context, label, kind = reason, "[started]");
            }
            EventKind::OperationRejected => {
                warn!(context, label, "[rejected] context destroyed");
            }
            EventKind::OperationFailed => {
                warn!(context, label, err = reason, "[failed]");
            }
            EventKind::DurableExited => {
                warn!(context, label, "[durable-exited]");
            }
            EventKind::ContextDestroyed => {
                info!(context, "[destroyed]");
            }
            EventKind::CleanupFailed => {
                warn!(context, err = reason, "[cleanup-failed]");
            }
            EventKind::ScramArmed => {
                debug!(context, budget_ms = ?e.budget_ms, "[scram-armed]");
            }
            EventKind::ProgressReported => {
                debug!(context, budget_ms = ?e.budget_ms, "[progress]");
            }
            EventKind::Scrammed => {
                error!(context, waiting = reason, "[scrammed]");
            }
            EventKind::ContextCompleted => {
                if e.reason.is_some() {
                    warn!(context, err = reason, "[completed]");
                } else {
                    info!(context, "[completed]");
                }
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = label, reason, "[subscriber-overflow]");
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = label, info = reason, "[subscriber-panicked]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
