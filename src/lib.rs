//! # ctxvisor
//!
//! **ctxvisor** is a structured-concurrency lifecycle coordinator for Tokio.
//!
//! A [`Context`] supervises in-flight operations and child contexts, cascades
//! shutdown through the tree, bounds shutdown time with a scram budget, and
//! resolves exactly once with an aggregated outcome: either a nested result
//! mapping built from durable operations, or a [`ContextError`] listing every
//! failure.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                    ┌───────────────────────────────────┐
//!                    │  Context "main" (root)            │
//!                    │  - waiting set (in-flight ops)    │
//!                    │  - cleanups, holds, errors        │
//!                    │  - result mapping                 │
//!                    └──┬──────────────┬──────────────┬──┘
//!          durable(op)  │ ephemeral(op)│              │ durable_child / ephemeral_child
//!                       ▼              ▼              ▼
//!                  ┌─────────┐    ┌─────────┐   ┌────────────────┐
//!                  │ task    │    │ task    │   │ Context "main. │
//!                  │ (spawn) │    │ (spawn) │   │  server" ...   │
//!                  └────┬────┘    └────┬────┘   └───────┬────────┘
//!                       └──── settle ──┴──── settle ────┘
//!                                        │
//!      every context publishes ──► Bus (broadcast) ──► listener ──► SubscriberSet
//!                                                                   ┌────┼────┐
//!                                                                   ▼    ▼    ▼
//!                                                                 sub1 sub2 subN
//! ```
//!
//! ### Lifecycle
//! ```text
//! Context::new ──► active ──destroy()──► destroying ──► draining ──► completed
//!                    │                      │              │
//!                    │ operations fail ─────┘              ├─ waiting empty, holds ≤ 0 ─► Ok / ERRORED
//!                    │ durable exits early ─┘              └─ budget elapsed ──────────► SCRAMMED
//! ```
//!
//! ## Features
//! | Area              | Description                                                         | Key types / traits                 |
//! |-------------------|---------------------------------------------------------------------|------------------------------------|
//! | **Contexts**      | Supervise operations, cascade shutdown, aggregate outcomes.         | [`Context`], [`ContextBuilder`]    |
//! | **Labels**        | Hierarchical names that address the result mapping.                 | [`Label`]                          |
//! | **Errors**        | Typed protocol errors with stable codes.                            | [`ContextError`], [`Recorded`]     |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom subscribers).  | [`Subscribe`], [`Event`]           |
//! | **Configuration** | Shutdown budget and bus sizing.                                     | [`ContextConfig`]                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use ctxvisor::{Context, ContextError};
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), ContextError> {
//!     let ctx = Context::with_budget("main", Duration::from_secs(5));
//!
//!     let server = ctx.durable_child("server")?;
//!     let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
//!     server.destruct(move || {
//!         let _ = stop_tx.send(());
//!         Ok(())
//!     });
//!     server.durable("requests", async move {
//!         let _ = stop_rx.await;
//!         Ok(128)
//!     })?;
//!
//!     ctx.destroy();
//!     let result = ctx.completion().await?;
//!     assert_eq!(result, json!({ "server": { "requests": 128 } }));
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod label;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    CleanupId, Context, ContextBuilder, ContextConfig, ContextId, DEFAULT_BUDGET, Outcome,
};
pub use error::{BoxError, ContextError, Durability, Recorded, Waiting};
pub use events::{Bus, Event, EventKind};
pub use label::Label;
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
