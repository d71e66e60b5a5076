//! Runtime core: contexts and their lifecycle.
//!
//! The only public entry points from this module are [`Context`] and
//! [`ContextBuilder`]; the rest is internal bookkeeping.
//!
//! Internal modules:
//! - [`context`]: the handle, the per-context state machine and completion;
//! - [`tree`]: durable and ephemeral child contexts;
//! - [`guard`]: guarded invocations (`durable`, `ephemeral`, `*_sync`);
//! - [`wrappers`]: inline error-handling wrappers (`exceptional`, `rescue`, ...);
//! - [`scram`]: the bounded-shutdown escalator;
//! - [`cleanup`]: the per-context cleanup registry;
//! - [`waiting`]: the per-context set of in-flight operations.

mod builder;
mod cleanup;
mod config;
mod context;
mod guard;
mod scram;
mod tree;
mod waiting;
mod wrappers;

pub use builder::ContextBuilder;
pub use cleanup::CleanupId;
pub use config::{ContextConfig, DEFAULT_BUDGET};
pub use context::{Context, ContextId, Outcome};
