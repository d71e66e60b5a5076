//! # Example: shutdown
//!
//! A small service tree shut down after a fixed run time.
//!
//! Shows how to:
//! - Attach the built-in [`LogWriter`] subscriber.
//! - Run a durable child ("server") whose loop stops on destruction.
//! - Report progress while shutting down, so the scram budget is not hit.
//! - Read the aggregated result mapping.
//!
//! ## Flow
//! ```text
//! main ──► durable_child("server") ──► durable("accept")   loop until stop
//!      ├─► ephemeral("warmup")                              finishes, no-op
//!      └─► destroy_after(300ms)
//!             └─► server destroyed ──► stop fired ──► accept returns {"served": N}
//! completion ──► { "server": { "accept": { "served": N } } }
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example shutdown --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use ctxvisor::{Context, ContextError, LogWriter, Subscribe};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct Served {
    served: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let ctx = Context::builder("main")
        .budget(Duration::from_millis(200))
        .with_subscribers(subs)
        .build();

    let server = ctx.durable_child("server")?;
    let stop = CancellationToken::new();
    let on_destroy = stop.clone();
    server.destruct(move || {
        on_destroy.cancel();
        Ok(())
    });

    let progress = server.clone();
    server.durable("accept", async move {
        let mut served = 0;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(50)) => served += 1,
            }
        }
        // Flushing takes longer than the budget; keep the deadline moving.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            progress.progress();
        }
        Ok::<_, ContextError>(Served { served })
    })?;

    ctx.ephemeral("warmup", async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, ContextError>(())
    })?;

    ctx.destroy_after(Duration::from_millis(300));

    let result = ctx.completion().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    // Give the log subscriber a moment to flush.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
