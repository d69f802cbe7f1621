//! The download worker: pulls request jobs, runs them through the
//! downloader, and hands successful responses to the spider.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::downloader::RequestMeta;
use crate::error::ScavengeError;
use crate::navigator::Navigator;
use crate::spider::Spider;

use super::retry::schedule_request_retry;
use super::{on_worker_exit, ReqJob, RunContext};

pub(crate) fn spawn_request_workers(
    workers: &mut JoinSet<()>,
    ctx: &Arc<RunContext>,
    spider: &Arc<dyn Spider>,
) {
    for _ in 0..ctx.cfg.parallel_downloads {
        let ctx = Arc::clone(ctx);
        let spider = Arc::clone(spider);
        workers.spawn(async move {
            request_worker(ctx, spider).await;
        });
    }
}

async fn request_worker(ctx: Arc<RunContext>, spider: Arc<dyn Spider>) {
    loop {
        tokio::select! {
            _ = ctx.token.cancelled() => break,
            received = ctx.req_rx.recv() => {
                let Ok(job) = received else {
                    // Channel closed: normal termination.
                    break;
                };
                tokio::select! {
                    _ = ctx.token.cancelled() => {
                        // The in-flight job is abandoned; release its count.
                        ctx.tracker.done();
                        break;
                    }
                    _ = handle_request(&ctx, spider.as_ref(), job) => {}
                }
            }
        }
    }
    on_worker_exit(&ctx);
}

async fn handle_request(ctx: &Arc<RunContext>, spider: &dyn Spider, job: ReqJob) {
    let referer = job.referer.as_ref().map(|u| u.as_str()).unwrap_or("");
    debug!(
        url = %job.request.url,
        referer,
        attempt = job.attempt,
        "downloading"
    );

    let meta = RequestMeta {
        referer: job.referer.clone(),
        attempt: job.attempt,
    };

    // The job keeps its request so a failure can be retried; the attempt
    // works on a clone, carrying over the one-shot body stream if present.
    let mut attempt_req = job.request.clone();
    if let Some(stream) = job.request.take_stream_body() {
        attempt_req.set_stream_body(stream);
    }

    match ctx.downloader.download(attempt_req, &meta).await {
        Ok(res) => {
            ctx.stats.increment_requests_succeeded();
            let nav = Navigator::new(Arc::clone(ctx), res.url().clone());
            if let Err(err) = spider.handle_response(&nav, &res).await {
                let err = ScavengeError::Spider(Box::new(err));
                error!(
                    url = %job.request.url,
                    referer,
                    attempt = job.attempt,
                    err = %err,
                    "spider handler failed"
                );
                if let Some(handler) = &ctx.cfg.on_spider_fail {
                    handler(&res, &err);
                }
                schedule_request_retry(ctx, job);
            }
        }
        Err(err) if err.is_dropped() => {
            info!(url = %job.request.url, err = %err, "request dropped");
            ctx.stats.increment_requests_dropped();
            if let Some(handler) = &ctx.cfg.on_request_fail {
                handler(&job.request, &err);
            }
        }
        Err(err) => {
            error!(
                url = %job.request.url,
                referer,
                attempt = job.attempt,
                err = %err,
                "request download failed"
            );
            ctx.stats.increment_requests_failed();
            if let Some(handler) = &ctx.cfg.on_request_fail {
                handler(&job.request, &err);
            }
            schedule_request_retry(ctx, job);
        }
    }

    ctx.tracker.done();
}
