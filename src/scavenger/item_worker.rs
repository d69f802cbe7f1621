//! The item worker: pulls item jobs and runs them through the pipeline
//! chain.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error};

use super::retry::schedule_item_retry;
use super::{on_worker_exit, ItemJob, RunContext};

pub(crate) fn spawn_item_workers(workers: &mut JoinSet<()>, ctx: &Arc<RunContext>) {
    for _ in 0..ctx.cfg.parallel_items {
        let ctx = Arc::clone(ctx);
        workers.spawn(async move {
            item_worker(ctx).await;
        });
    }
}

async fn item_worker(ctx: Arc<RunContext>) {
    loop {
        tokio::select! {
            _ = ctx.token.cancelled() => break,
            received = ctx.item_rx.recv() => {
                let Ok(job) = received else {
                    break;
                };
                tokio::select! {
                    _ = ctx.token.cancelled() => {
                        ctx.tracker.done();
                        break;
                    }
                    _ = handle_item(&ctx, job) => {}
                }
            }
        }
    }
    on_worker_exit(&ctx);
}

async fn handle_item(ctx: &Arc<RunContext>, job: ItemJob) {
    debug!(attempt = job.attempt, "processing item");

    match ctx.processor.process(job.item.clone()).await {
        Ok(_) => ctx.stats.increment_items_processed(),
        Err(err) => {
            error!(
                item = ?job.item,
                attempt = job.attempt,
                err = %err,
                "item processing failed"
            );
            ctx.stats.increment_items_failed();
            if let Some(handler) = &ctx.cfg.on_item_fail {
                handler(&job.item, &err);
            }
            schedule_item_retry(ctx, job);
        }
    }

    ctx.tracker.done();
}
