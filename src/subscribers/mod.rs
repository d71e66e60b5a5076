//! # Event subscribers for context trees.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out,
//! and the optional built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Context ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                       │
//!                                         ┌─────────────┼─────────────┐
//!                                         ▼             ▼             ▼
//!                                     LogWriter      Metrics        Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
