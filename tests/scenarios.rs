//! End-to-end lifecycle scenarios for context trees.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ctxvisor::{Context, ContextError, Durability, Event, EventKind, Label, Subscribe};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(2);

async fn finish(ctx: &Context) -> Result<serde_json::Value, ContextError> {
    timeout(LIMIT, ctx.completion())
        .await
        .expect("completion timed out")
}

#[tokio::test]
async fn test_empty_context_destroys_to_empty_success() {
    let ctx = Context::new("main");
    ctx.destroy();
    assert_eq!(finish(&ctx).await.unwrap(), json!({}));
}

#[tokio::test]
async fn test_durable_values_nest_under_array_paths() {
    let ctx = Context::new("main");
    let (one_tx, one_rx) = oneshot::channel::<i32>();
    let (two_tx, two_rx) = oneshot::channel::<i32>();
    ctx.durable(("p", 1), async move { one_rx.await.map_err(ContextError::operation) })
        .unwrap();
    ctx.durable(("p", 2), async move { two_rx.await.map_err(ContextError::operation) })
        .unwrap();

    ctx.destroy();
    two_tx.send(2).unwrap();
    one_tx.send(1).unwrap();

    assert_eq!(finish(&ctx).await.unwrap(), json!({ "p": { "1": 1, "2": 2 } }));
}

#[tokio::test]
async fn test_stuck_durable_scrams_within_budget() {
    let ctx = Context::with_budget("main", Duration::from_millis(50));
    ctx.durable("stuck", std::future::pending::<Result<(), ContextError>>())
        .unwrap();
    ctx.destroy();

    let err = finish(&ctx).await.unwrap_err();
    assert_eq!(err.code(), "SCRAMMED");
    let labels: Vec<String> = err.waiting().iter().map(|w| w.label.to_string()).collect();
    assert_eq!(labels, vec!["stuck"]);
    assert!(ctx.is_completed());
}

#[tokio::test]
async fn test_durable_failure_is_listed_under_its_label() {
    let ctx = Context::new("main");
    ctx.durable("x", async { Err::<(), _>(ContextError::msg("thrown")) })
        .unwrap();

    let err = finish(&ctx).await.unwrap_err();
    assert_eq!(err.code(), "ERRORED");
    assert_eq!(err.errors()[0].label, Label::from("x"));
    assert_eq!(err.errors()[0].error.to_string(), "thrown");
    assert!(err.waiting().is_empty());
}

#[tokio::test]
async fn test_durable_success_before_destroy_reports_durable() {
    let ctx = Context::new("main");
    ctx.durable_sync("early", || Ok(1)).unwrap();

    assert!(ctx.is_destroyed());
    let err = finish(&ctx).await.unwrap_err();
    assert_eq!(err.errors()[0].error.code(), "DURABLE");
}

#[tokio::test]
async fn test_ephemeral_child_clean_destroy_leaves_parent_alive() {
    let root = Context::new("main");
    let child = root.ephemeral_child("job").unwrap();
    child.ephemeral("work", async { Ok(()) }).unwrap();
    child.destroy();
    finish(&child).await.unwrap();

    assert!(!root.is_destroyed());
    root.destroy();
    assert_eq!(finish(&root).await.unwrap(), json!({}));
}

#[tokio::test]
async fn test_ephemeral_child_failure_destroys_parent() {
    let root = Context::new("main");
    let child = root.ephemeral_child("job").unwrap();
    child
        .ephemeral("work", async { Err::<(), _>(ContextError::msg("job broke")) })
        .unwrap();

    let err = finish(&root).await.unwrap_err();
    assert!(root.is_destroyed());
    assert_eq!(err.errors()[0].label, Label::from("job"));
    assert!(err.contains_code("OPERATION"));
}

#[tokio::test]
async fn test_parent_scram_reaches_every_descendant() {
    let root = Context::with_budget("main", Duration::from_millis(50));
    let child = root.durable_child_with("server", Duration::ZERO).unwrap();
    let grandchild = child.ephemeral_child("conn").unwrap();
    grandchild
        .durable("read", std::future::pending::<Result<u8, ContextError>>())
        .unwrap();

    root.destroy();
    let err = finish(&root).await.unwrap_err();
    assert_eq!(err.code(), "SCRAMMED");
    assert!(child.is_completed());
    assert!(grandchild.is_completed());
    assert_eq!(grandchild.try_outcome().unwrap().unwrap_err().code(), "SCRAMMED");
}

#[tokio::test]
async fn test_progress_defers_scram() {
    let ctx = Context::with_budget("main", Duration::from_millis(120));
    let (tx, rx) = oneshot::channel::<&'static str>();
    ctx.durable("slow", async move { rx.await.map_err(ContextError::operation) })
        .unwrap();
    ctx.destroy();

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(30)).await;
        ctx.progress();
    }
    assert!(!ctx.is_completed());
    tx.send("done").unwrap();
    assert_eq!(finish(&ctx).await.unwrap(), json!({ "slow": "done" }));
}

#[tokio::test]
async fn test_holds_complete_once_not_positive() {
    let ctx = Context::new("main");
    ctx.increment();
    ctx.increment();
    ctx.destroy();
    ctx.decrement();
    assert!(ctx.try_outcome().is_none());
    ctx.decrement();
    ctx.decrement();
    assert_eq!(finish(&ctx).await.unwrap(), json!({}));
}

#[tokio::test]
async fn test_drain_ignores_later_registrations() {
    let ctx = Context::new("main");
    let (tx, rx) = oneshot::channel::<()>();
    ctx.ephemeral("first", async move { rx.await.map_err(ContextError::operation) })
        .unwrap();

    let drainer = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.drain().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    ctx.ephemeral("later", std::future::pending::<Result<(), ContextError>>())
        .unwrap();
    tx.send(()).unwrap();

    timeout(LIMIT, drainer).await.unwrap().unwrap();
    assert_eq!(ctx.waiting().len(), 1);
    assert_eq!(ctx.waiting()[0].label.to_string(), "later");
}

#[tokio::test]
async fn test_concurrent_drains_resolve_independently() {
    let ctx = Context::new("main");
    let (a_tx, a_rx) = oneshot::channel::<()>();
    ctx.ephemeral("a", async move { a_rx.await.map_err(ContextError::operation) })
        .unwrap();
    let first = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.drain().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let (b_tx, b_rx) = oneshot::channel::<()>();
    ctx.ephemeral("b", async move { b_rx.await.map_err(ContextError::operation) })
        .unwrap();
    let second = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.drain().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    a_tx.send(()).unwrap();
    timeout(LIMIT, first).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!second.is_finished());

    b_tx.send(()).unwrap();
    timeout(LIMIT, second).await.unwrap().unwrap();
    assert!(ctx.waiting().is_empty());
    assert!(!ctx.is_destroyed());
}

#[tokio::test]
async fn test_drain_returns_when_context_scrams() {
    let ctx = Context::with_budget("main", Duration::from_millis(30));
    ctx.durable("stuck", std::future::pending::<Result<(), ContextError>>())
        .unwrap();
    ctx.destroy();

    timeout(LIMIT, ctx.drain()).await.unwrap();
    assert!(ctx.is_completed());
    assert_eq!(finish(&ctx).await.unwrap_err().code(), "SCRAMMED");
}

#[tokio::test]
async fn test_scram_keeps_errors_recorded_before_it() {
    let ctx = Context::with_budget("main", Duration::from_millis(30));
    ctx.durable("stuck", std::future::pending::<Result<(), ContextError>>())
        .unwrap();
    ctx.destroy_with(ContextError::msg("boom"));

    let err = finish(&ctx).await.unwrap_err();
    assert_eq!(err.code(), "SCRAMMED");
    assert_eq!(err.errors().len(), 1);
    assert_eq!(err.errors()[0].label.to_string(), "main");
    assert_eq!(err.errors()[0].error.to_string(), "boom");
    assert_eq!(err.waiting().len(), 1);
    assert_eq!(err.waiting()[0].label.to_string(), "stuck");
    assert_eq!(err.waiting()[0].kind, Durability::Durable);
}

#[tokio::test]
async fn test_empty_label_value_keeps_sibling_results() {
    let ctx = Context::new("main");
    let (kept_tx, kept_rx) = oneshot::channel::<i32>();
    let (bare_tx, bare_rx) = oneshot::channel::<i32>();
    ctx.durable("kept", async move { kept_rx.await.map_err(ContextError::operation) })
        .unwrap();
    let bare = Label::from(Vec::<String>::new());
    ctx.durable(bare, async move { bare_rx.await.map_err(ContextError::operation) })
        .unwrap();

    ctx.destroy();
    kept_tx.send(1).unwrap();
    bare_tx.send(2).unwrap();

    assert_eq!(finish(&ctx).await.unwrap(), json!({ "kept": 1, "": 2 }));
}

#[derive(Serialize)]
struct Stats {
    served: u32,
}

#[tokio::test]
async fn test_durable_child_results_nest_under_child_label() {
    let root = Context::new("main");
    let server = root.durable_child("server").unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    server.destruct(move || {
        let _ = stop_tx.send(());
        Ok(())
    });
    server
        .durable("stats", async move {
            let _ = stop_rx.await;
            Ok(Stats { served: 3 })
        })
        .unwrap();

    root.destroy();
    assert_eq!(
        finish(&root).await.unwrap(),
        json!({ "server": { "stats": { "served": 3 } } })
    );
}

#[tokio::test]
async fn test_late_settlement_after_scram_is_ignored() {
    let ctx = Context::with_budget("main", Duration::from_millis(20));
    let (tx, rx) = oneshot::channel::<()>();
    ctx.durable("late", async move {
        let _ = rx.await;
        Err::<(), _>(ContextError::msg("too late"))
    })
    .unwrap();
    ctx.destroy();

    let first = finish(&ctx).await.unwrap_err();
    let _ = tx.send(());
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = finish(&ctx).await.unwrap_err();
    assert_eq!(first.code(), "SCRAMMED");
    assert!(first.errors().is_empty());
    assert!(second.errors().is_empty());
}

struct Collect(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Collect {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().push(ev.kind);
    }
}

#[tokio::test]
async fn test_subscribers_observe_lifecycle() {
    let collect = Arc::new(Collect(Mutex::new(Vec::new())));
    let subs: Vec<Arc<dyn Subscribe>> = vec![collect.clone() as Arc<dyn Subscribe>];
    let ctx = Context::builder("main").with_subscribers(subs).build();
    ctx.ephemeral_sync("ping", || Ok(())).unwrap();
    ctx.destroy();
    finish(&ctx).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let seen = collect.0.lock().clone();
    assert_eq!(seen.first(), Some(&EventKind::ContextCreated));
    assert!(seen.contains(&EventKind::OperationStarted));
    assert!(seen.contains(&EventKind::ContextDestroyed));
    assert_eq!(seen.last(), Some(&EventKind::ContextCompleted));
}
