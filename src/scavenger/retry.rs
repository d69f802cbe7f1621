//! Retry scheduling with jittered exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use super::{ItemJob, ReqJob, RunContext};

/// Delay before retry number `attempt` (1-based): `2^attempt` seconds plus a
/// uniform jitter in `[0, 2^attempt)` seconds, clamped to the configured
/// bounds. Monotonic non-decreasing in `attempt` up to the clamp.
pub(crate) fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
    let seconds = 1u64 << attempt.min(31);
    let jitter = rand::thread_rng().gen_range(0..seconds);
    Duration::from_secs(seconds + jitter).clamp(min, max)
}

/// Arms a timer that re-enqueues the request with an incremented attempt
/// counter. The timer holds a work count; if the run is cancelled before it
/// fires, the retry is abandoned and the count released.
pub(crate) fn schedule_request_retry(ctx: &Arc<RunContext>, job: ReqJob) {
    let attempt = job.attempt + 1;
    let delay = backoff_delay(attempt, ctx.cfg.min_retry_delay, ctx.cfg.max_retry_delay);
    debug!(url = %job.request.url, attempt, ?delay, "scheduling request retry");
    ctx.stats.increment_requests_retried();

    ctx.tracker.add(1);
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        tokio::select! {
            _ = ctx.token.cancelled() => {}
            _ = sleep(delay) => {
                ctx.queue_request(job.request, job.referer, attempt);
            }
        }
        ctx.tracker.done();
    });
}

/// The item-side counterpart of [`schedule_request_retry`].
pub(crate) fn schedule_item_retry(ctx: &Arc<RunContext>, job: ItemJob) {
    let attempt = job.attempt + 1;
    let delay = backoff_delay(attempt, ctx.cfg.min_retry_delay, ctx.cfg.max_retry_delay);
    debug!(attempt, ?delay, "scheduling item retry");
    ctx.stats.increment_items_retried();

    ctx.tracker.add(1);
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        tokio::select! {
            _ = ctx.token.cancelled() => {}
            _ = sleep(delay) => {
                ctx.queue_item(job.item, attempt);
            }
        }
        ctx.tracker.done();
    });
}
