use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::config::ContextConfig;
use super::context::{Context, Inner};
use crate::{
    events::{Bus, Event, EventKind},
    label::Label,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a root [`Context`] with optional features.
pub struct ContextBuilder {
    label: Label,
    cfg: ContextConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ContextBuilder {
    /// Creates a new builder with the default configuration.
    pub fn new(label: impl Into<Label>) -> Self {
        Self {
            label: label.into(),
            cfg: ContextConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, cfg: ContextConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the shutdown budget (`0s` = unbounded).
    pub fn budget(mut self, budget: Duration) -> Self {
        self.cfg.budget = budget;
        self
    }

    /// Disables the scram escalator for the whole tree.
    pub fn unbounded(mut self) -> Self {
        self.cfg.budget = Duration::ZERO;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every event of the tree through dedicated workers
    /// with bounded queues. Requires a Tokio runtime at [`build`](Self::build) time.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the root context.
    ///
    /// When subscribers are configured, the listener is spawned here and stops
    /// once the root context completes.
    pub fn build(self) -> Context {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let listener = if subs.is_empty() {
            None
        } else {
            let stop = CancellationToken::new();
            subs.listen(stop.clone());
            Some(stop)
        };

        let budget = self.cfg.scram_budget();
        let inner = Inner::new(self.label, self.cfg, bus, None, listener);
        let mut created = Event::new(EventKind::ContextCreated);
        if let Some(budget) = budget {
            created = created.with_budget(budget);
        }
        inner.publish(created);
        Context::from_inner(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[test]
    fn test_builder_budget_and_unbounded() {
        let ctx = ContextBuilder::new("main")
            .budget(Duration::from_millis(250))
            .build();
        assert_eq!(ctx.budget(), Some(Duration::from_millis(250)));

        let ctx = ContextBuilder::new("main").unbounded().build();
        assert_eq!(ctx.budget(), None);
    }

    struct Collect(Mutex<Vec<Event>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, event: &Event) {
            self.0.lock().push(event.clone());
        }
    }

    #[tokio::test]
    async fn test_created_event_reaches_subscribers() {
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let ctx = ContextBuilder::new("main")
            .budget(Duration::from_millis(250))
            .with_subscribers(vec![collect.clone() as Arc<dyn Subscribe>])
            .build();
        ctx.destroy();
        ctx.completion().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let seen = collect.0.lock().clone();
        let created = seen.first().unwrap();
        assert_eq!(created.kind, EventKind::ContextCreated);
        assert_eq!(created.context.as_deref(), Some("main"));
        assert_eq!(created.budget_ms, Some(250));
    }
}
