//! Error types used by the ctxvisor runtime and supervised operations.
//!
//! This module defines [`ContextError`], the single error type surfaced by contexts,
//! together with its diagnostic building blocks:
//!
//! - [`Recorded`] an error paired with the label of the operation that produced it;
//! - [`Waiting`] a snapshot entry of an operation that was still in flight;
//! - [`Durability`] whether an operation (or child) is durable or ephemeral.
//!
//! Every variant carries a stable upper-case [`code`](ContextError::code)
//! (`DESTROYED`, `DURABLE`, `SCRAMMED`, `ERRORED`, ...) and a snake_case
//! [`as_label`](ContextError::as_label) for logs/metrics.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::label::Label;

/// Boxed error accepted from supervised operations.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Declared durability of a supervised operation or child context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Durability {
    /// Part of the owner's reason for living; finishing early is an anomaly.
    Durable,
    /// Ordinary completion is a no-op; only failure propagates.
    Ephemeral,
}

impl Durability {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Durability::Durable => "durable",
            Durability::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// An operation still in flight when a context was snapshotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waiting {
    /// Label of the operation.
    pub label: Label,
    /// Declared durability of the operation.
    pub kind: Durability,
}

impl fmt::Display for Waiting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.kind)
    }
}

/// An error tagged with the label of the operation that produced it.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Label of the failing operation (or of the context itself).
    pub label: Label,
    /// The error.
    pub error: ContextError,
}

impl Recorded {
    /// Pairs `error` with `label`.
    pub fn new(label: impl Into<Label>, error: impl Into<ContextError>) -> Self {
        Self {
            label: label.into(),
            error: error.into(),
        }
    }
}

impl fmt::Display for Recorded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

/// # Errors produced by contexts and their supervised operations.
///
/// The first three variants are the protocol taxonomy; [`ContextError::Errored`]
/// is the composite failure a context completes with; [`ContextError::Operation`]
/// and [`ContextError::Panicked`] are pass-through causes.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ContextError {
    /// A guarded invocation was attempted after the context began shutting down.
    #[error("context {context} is destroyed")]
    Destroyed {
        /// Label of the destroyed context.
        context: Label,
    },

    /// A durable operation finished before its context began shutting down.
    #[error("durable operation {label} exited before context {context} was destroyed")]
    Durable {
        /// Label of the owning context.
        context: Label,
        /// Label of the durable operation.
        label: Label,
    },

    /// The shutdown budget elapsed with operations still outstanding.
    #[error("context {context} scrammed after {budget:?}; waiting: {}", join(.waiting))]
    Scrammed {
        /// Label of the scrammed context.
        context: Label,
        /// The configured budget that was exceeded.
        budget: Duration,
        /// Errors accumulated before the forced termination.
        errors: Vec<Recorded>,
        /// Operations still outstanding at the moment of forced termination.
        waiting: Vec<Waiting>,
    },

    /// The context completed with one or more accumulated errors.
    #[error("context {context} failed: {}", join(.errors))]
    Errored {
        /// Label of the failed context.
        context: Label,
        /// Accumulated errors in settlement order.
        errors: Vec<Recorded>,
        /// Operations that never completed (empty unless forced).
        waiting: Vec<Waiting>,
    },

    /// Error raised by a supervised operation or a cleanup callback.
    #[error("{0}")]
    Operation(Arc<dyn StdError + Send + Sync + 'static>),

    /// A supervised operation or cleanup callback panicked.
    #[error("panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl ContextError {
    /// Wraps an arbitrary error as a pass-through cause.
    pub fn operation(error: impl Into<BoxError>) -> Self {
        ContextError::Operation(Arc::from(error.into()))
    }

    /// Creates a pass-through cause from a plain message.
    ///
    /// # Example
    /// ```
    /// use ctxvisor::ContextError;
    ///
    /// let err = ContextError::msg("thrown");
    /// assert_eq!(err.to_string(), "thrown");
    /// assert_eq!(err.code(), "OPERATION");
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        Self::operation(message.into())
    }

    /// Converts a caught panic payload into an error.
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        ContextError::Panicked { message }
    }

    /// Returns the stable upper-case error code.
    ///
    /// # Example
    /// ```
    /// use ctxvisor::{ContextError, Label};
    ///
    /// let err = ContextError::Destroyed { context: Label::from("main") };
    /// assert_eq!(err.code(), "DESTROYED");
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            ContextError::Destroyed { .. } => "DESTROYED",
            ContextError::Durable { .. } => "DURABLE",
            ContextError::Scrammed { .. } => "SCRAMMED",
            ContextError::Errored { .. } => "ERRORED",
            ContextError::Operation(_) => "OPERATION",
            ContextError::Panicked { .. } => "PANICKED",
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ContextError::Destroyed { .. } => "context_destroyed",
            ContextError::Durable { .. } => "durable_exited",
            ContextError::Scrammed { .. } => "context_scrammed",
            ContextError::Errored { .. } => "context_errored",
            ContextError::Operation(_) => "operation_failed",
            ContextError::Panicked { .. } => "operation_panicked",
        }
    }

    /// Returns the ordered list of child causes (empty for leaf errors).
    pub fn errors(&self) -> &[Recorded] {
        match self {
            ContextError::Scrammed { errors, .. } | ContextError::Errored { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Returns the waiting snapshot (empty for leaf errors).
    pub fn waiting(&self) -> &[Waiting] {
        match self {
            ContextError::Scrammed { waiting, .. } | ContextError::Errored { waiting, .. } => {
                waiting
            }
            _ => &[],
        }
    }

    /// True if this error or any nested cause carries `code`.
    pub fn contains_code(&self, code: &str) -> bool {
        self.code() == code || self.errors().iter().any(|r| r.error.contains_code(code))
    }
}

impl From<BoxError> for ContextError {
    fn from(value: BoxError) -> Self {
        ContextError::Operation(Arc::from(value))
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_labels() {
        let scrammed = ContextError::Scrammed {
            context: Label::from("main"),
            budget: Duration::from_millis(50),
            errors: vec![],
            waiting: vec![Waiting {
                label: Label::from("stuck"),
                kind: Durability::Durable,
            }],
        };
        assert_eq!(scrammed.code(), "SCRAMMED");
        assert_eq!(scrammed.as_label(), "context_scrammed");
        assert_eq!(scrammed.waiting()[0].label.to_string(), "stuck");
        assert!(scrammed.to_string().contains("stuck(durable)"));
    }

    #[test]
    fn test_contains_code_searches_nested_causes() {
        let inner = ContextError::Durable {
            context: Label::from("child"),
            label: Label::from("loop"),
        };
        let outer = ContextError::Errored {
            context: Label::from("main"),
            errors: vec![Recorded::new("child", inner)],
            waiting: vec![],
        };
        assert!(outer.contains_code("DURABLE"));
        assert!(!outer.contains_code("SCRAMMED"));
    }

    #[test]
    fn test_panic_payloads_render() {
        let err = ContextError::panicked(Box::new("boom"));
        assert_eq!(err.to_string(), "panicked: boom");
        let err = ContextError::panicked(Box::new(String::from("bang")));
        assert_eq!(err.code(), "PANICKED");
        assert_eq!(err.to_string(), "panicked: bang");
    }
}
