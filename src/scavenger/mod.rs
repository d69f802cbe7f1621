//! The scavenger: the engine that drives a spider through the
//! fetch → parse → enqueue → process loop.
//!
//! A run owns two worker pools fed by mpmc channels: download workers pull
//! request jobs through the [`Downloader`] and hand responses to the spider,
//! item workers push items through the [`Processor`]. An outstanding-work
//! counter tracks every job from enqueue to completion; the run ends when it
//! reaches zero or the cancellation token fires.
//!
//! Enqueueing never blocks the caller: the channels are unbounded and the
//! send either lands or fails fast because the run is shutting down, in
//! which case the job's work count is released on the spot. On cancellation
//! the last worker to exit closes both channels, so racing enqueues fail
//! instead of stranding jobs, then drains the backlog into a best-effort
//! snapshot for the configured [`StateStore`]. The next run re-enqueues that
//! snapshot instead of asking the spider for starting requests, with attempt
//! counters reset to zero.

mod item_worker;
mod request_worker;
mod retry;
mod tracker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::codec::{MetaCodec, TaggedCodec};
use crate::downloader::Downloader;
use crate::error::ScavengeError;
use crate::item::Item;
use crate::pipeline::Processor;
use crate::request::Request;
use crate::response::Response;
use crate::spider::Spider;
use crate::state::{Snapshot, StateStore};
use crate::stats::StatCollector;

use item_worker::spawn_item_workers;
use request_worker::spawn_request_workers;
use tracker::WorkTracker;

pub type RequestFailHandler = Box<dyn Fn(&Request, &ScavengeError) + Send + Sync>;
pub type SpiderFailHandler = Box<dyn Fn(&Response, &ScavengeError) + Send + Sync>;
pub type ItemFailHandler = Box<dyn Fn(&Item, &ScavengeError) + Send + Sync>;

pub(crate) struct ReqJob {
    pub request: Request,
    pub referer: Option<Url>,
    pub attempt: u32,
}

pub(crate) struct ItemJob {
    pub item: Item,
    pub attempt: u32,
}

pub(crate) struct Config {
    pub parallel_downloads: usize,
    pub parallel_items: usize,
    pub min_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub state_store: Option<Arc<dyn StateStore>>,
    pub codec: Arc<dyn MetaCodec>,
    pub on_request_fail: Option<RequestFailHandler>,
    pub on_spider_fail: Option<SpiderFailHandler>,
    pub on_item_fail: Option<ItemFailHandler>,
}

/// Everything a single run shares between its workers, retry timers, and
/// navigators.
pub(crate) struct RunContext {
    pub(crate) downloader: Arc<Downloader>,
    pub(crate) processor: Arc<Processor>,
    pub(crate) cfg: Arc<Config>,
    pub(crate) stats: Arc<StatCollector>,
    pub(crate) token: CancellationToken,
    pub(crate) tracker: WorkTracker,
    pub(crate) req_tx: async_channel::Sender<ReqJob>,
    pub(crate) req_rx: async_channel::Receiver<ReqJob>,
    pub(crate) item_tx: async_channel::Sender<ItemJob>,
    pub(crate) item_rx: async_channel::Receiver<ItemJob>,
    exited_workers: AtomicUsize,
    total_workers: usize,
}

impl RunContext {
    /// Queues a request job. Accounts for the work before the send so the
    /// counter can never under-read, and releases it if the send fails
    /// because the run is shutting down.
    pub(crate) fn queue_request(&self, request: Request, referer: Option<Url>, attempt: u32) {
        self.tracker.add(1);
        self.stats.increment_requests_enqueued();
        let url = request.url.clone();
        let job = ReqJob {
            request,
            referer,
            attempt,
        };
        if self.req_tx.try_send(job).is_err() {
            debug!(url = %url, "request enqueued during shutdown, dropping");
            self.tracker.done();
        }
    }

    /// Queues an item job; same accounting as [`Self::queue_request`].
    pub(crate) fn queue_item(&self, item: Item, attempt: u32) {
        self.tracker.add(1);
        self.stats.increment_items_enqueued();
        if self.item_tx.try_send(ItemJob { item, attempt }).is_err() {
            debug!("item enqueued during shutdown, dropping");
            self.tracker.done();
        }
    }
}

/// Called by every worker on its way out. The last one closes both channels
/// and drains whatever is still queued; on cancellation the drained jobs are
/// snapshotted to the state store.
pub(crate) fn on_worker_exit(ctx: &Arc<RunContext>) {
    let exited = ctx.exited_workers.fetch_add(1, Ordering::SeqCst) + 1;
    if exited != ctx.total_workers {
        return;
    }

    // Close first: any enqueue racing this drain now fails fast and releases
    // its own work count instead of landing in a queue nobody reads.
    ctx.req_tx.close();
    ctx.item_tx.close();

    let mut snapshot = Snapshot::default();
    let store = if ctx.token.is_cancelled() {
        ctx.cfg.state_store.as_ref()
    } else {
        None
    };
    let keep = store.is_some();

    while let Ok(job) = ctx.req_rx.try_recv() {
        if keep {
            if let Err(err) =
                snapshot.push_request(&job.request, job.referer.as_ref(), ctx.cfg.codec.as_ref())
            {
                warn!(url = %job.request.url, err = %err, "skipping request in snapshot");
            }
        }
        ctx.tracker.done();
    }
    while let Ok(job) = ctx.item_rx.try_recv() {
        if keep {
            if let Err(err) = snapshot.push_item(&job.item, ctx.cfg.codec.as_ref()) {
                warn!(err = %err, "skipping item in snapshot");
            }
        }
        ctx.tracker.done();
    }

    if let Some(store) = store {
        match snapshot.encode() {
            Ok(bytes) => match store.store(&bytes) {
                Ok(()) => info!(jobs = snapshot.len(), "saved pending work"),
                Err(err) => error!(%err, "save state: write store"),
            },
            Err(err) => error!(%err, "save state: encode snapshot"),
        }
    }

    if ctx.token.is_cancelled() {
        info!("scavenger shut down");
    }
}

/// The engine. Construct one with [`Scavenger::builder`], then call
/// [`run`](Scavenger::run) with a spider. A scavenger can run again after a
/// run completes (that is how a cancelled run resumes from its snapshot),
/// but a single instance must not run concurrently with itself.
pub struct Scavenger {
    downloader: Arc<Downloader>,
    processor: Arc<Processor>,
    cfg: Arc<Config>,
    stats: Arc<StatCollector>,
}

impl Scavenger {
    pub fn builder(downloader: Downloader, processor: Processor) -> ScavengerBuilder {
        ScavengerBuilder::new(downloader, processor)
    }

    /// The statistics collected across this scavenger's runs.
    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// Runs the spider until all work is done or `token` is cancelled.
    pub async fn run(&self, token: CancellationToken, spider: Arc<dyn Spider>) {
        let (req_tx, req_rx) = async_channel::unbounded();
        let (item_tx, item_rx) = async_channel::unbounded();
        let ctx = Arc::new(RunContext {
            downloader: Arc::clone(&self.downloader),
            processor: Arc::clone(&self.processor),
            cfg: Arc::clone(&self.cfg),
            stats: Arc::clone(&self.stats),
            token: token.clone(),
            tracker: WorkTracker::default(),
            req_tx,
            req_rx,
            item_tx,
            item_rx,
            exited_workers: AtomicUsize::new(0),
            total_workers: self.cfg.parallel_downloads + self.cfg.parallel_items,
        });

        info!(
            parallel_downloads = self.cfg.parallel_downloads,
            parallel_items = self.cfg.parallel_items,
            "running spider"
        );

        let mut workers = JoinSet::new();
        spawn_request_workers(&mut workers, &ctx, &spider);
        spawn_item_workers(&mut workers, &ctx);

        if !self.resume_from_snapshot(&ctx) {
            for request in spider.starting_requests() {
                ctx.queue_request(request, None, 0);
            }
        }

        tokio::select! {
            _ = token.cancelled() => {}
            _ = ctx.tracker.wait_idle() => {
                // All work accounted for; closing the channels sends the
                // workers home.
                ctx.req_tx.close();
                ctx.item_tx.close();
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(%err, "worker task failed");
            }
        }

        // Abandoned in-flight jobs and armed retry timers release their
        // counts on cancellation; wait for the counter to bleed out so the
        // run never leaks work.
        ctx.tracker.wait_idle().await;

        info!(stats = %self.stats, "spider run finished");
    }

    /// Re-enqueues a saved snapshot, if there is one. Any failure to load or
    /// decode logs a warning and the run proceeds from scratch.
    fn resume_from_snapshot(&self, ctx: &Arc<RunContext>) -> bool {
        let Some(store) = &self.cfg.state_store else {
            return false;
        };
        let bytes = match store.load() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(err) => {
                warn!(%err, "load saved state failed, starting from scratch");
                return false;
            }
        };
        let snapshot = match Snapshot::decode(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "saved state does not decode, starting from scratch");
                return false;
            }
        };
        if snapshot.is_empty() {
            return false;
        }
        let (reqs, items) = match snapshot.into_jobs(self.cfg.codec.as_ref()) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(%err, "saved state does not decode, starting from scratch");
                return false;
            }
        };

        info!(
            requests = reqs.len(),
            items = items.len(),
            "resuming from saved state"
        );
        for (request, referer) in reqs {
            ctx.queue_request(request, referer, 0);
        }
        for item in items {
            ctx.queue_item(item, 0);
        }
        true
    }
}

/// Configures and builds a [`Scavenger`].
pub struct ScavengerBuilder {
    downloader: Downloader,
    processor: Processor,
    parallel_downloads: usize,
    parallel_items: usize,
    min_retry_delay: Duration,
    max_retry_delay: Duration,
    state_store: Option<Arc<dyn StateStore>>,
    codec: Arc<dyn MetaCodec>,
    on_request_fail: Option<RequestFailHandler>,
    on_spider_fail: Option<SpiderFailHandler>,
    on_item_fail: Option<ItemFailHandler>,
}

impl ScavengerBuilder {
    fn new(downloader: Downloader, processor: Processor) -> Self {
        let cpus = num_cpus::get();
        let parallel_downloads = (cpus / 2).max(1);
        Self {
            downloader,
            processor,
            parallel_downloads,
            parallel_items: (cpus.saturating_sub(parallel_downloads)).max(1),
            min_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(3600),
            state_store: None,
            codec: Arc::new(TaggedCodec::new()),
            on_request_fail: None,
            on_spider_fail: None,
            on_item_fail: None,
        }
    }

    /// How many requests (and responses) are processed in parallel.
    pub fn parallel_downloads(mut self, count: usize) -> Self {
        self.parallel_downloads = count;
        self
    }

    /// How many items are processed in parallel.
    pub fn parallel_items(mut self, count: usize) -> Self {
        self.parallel_items = count;
        self
    }

    /// Bounds on the retry backoff delay.
    pub fn retry_delay_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_retry_delay = min;
        self.max_retry_delay = max;
        self
    }

    /// Where incomplete scraping state is saved on cancellation and loaded
    /// from on the next run.
    pub fn state_store(mut self, store: impl StateStore + 'static) -> Self {
        self.state_store = Some(Arc::new(store));
        self
    }

    /// The codec used to persist request metadata and item values, both for
    /// state snapshots and filesystem replay entries.
    pub fn meta_codec(mut self, codec: Arc<dyn MetaCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Called for requests that fail before, during, or after the fetch with
    /// a non-dropped error.
    pub fn on_request_fail(
        mut self,
        handler: impl Fn(&Request, &ScavengeError) + Send + Sync + 'static,
    ) -> Self {
        self.on_request_fail = Some(Box::new(handler));
        self
    }

    /// Called when a spider's response handler returns an error.
    pub fn on_spider_handler_fail(
        mut self,
        handler: impl Fn(&Response, &ScavengeError) + Send + Sync + 'static,
    ) -> Self {
        self.on_spider_fail = Some(Box::new(handler));
        self
    }

    /// Called when item processing returns an error.
    pub fn on_item_processor_fail(
        mut self,
        handler: impl Fn(&Item, &ScavengeError) + Send + Sync + 'static,
    ) -> Self {
        self.on_item_fail = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<Scavenger, ScavengeError> {
        if self.parallel_downloads == 0 {
            return Err(ScavengeError::Config(
                "parallel_downloads must be greater than 0".into(),
            ));
        }
        if self.parallel_items == 0 {
            return Err(ScavengeError::Config(
                "parallel_items must be greater than 0".into(),
            ));
        }
        if self.min_retry_delay > self.max_retry_delay {
            return Err(ScavengeError::Config(format!(
                "min retry delay {:?} cannot be greater than max retry delay {:?}",
                self.min_retry_delay, self.max_retry_delay
            )));
        }

        Ok(Scavenger {
            downloader: Arc::new(self.downloader),
            processor: Arc::new(self.processor),
            cfg: Arc::new(Config {
                parallel_downloads: self.parallel_downloads,
                parallel_items: self.parallel_items,
                min_retry_delay: self.min_retry_delay,
                max_retry_delay: self.max_retry_delay,
                state_store: self.state_store,
                codec: self.codec,
                on_request_fail: self.on_request_fail,
                on_spider_fail: self.on_spider_fail,
                on_item_fail: self.on_item_fail,
            }),
            stats: Arc::new(StatCollector::new()),
        })
    }
}

#[cfg(test)]
impl RunContext {
    pub(crate) fn for_tests() -> Arc<Self> {
        use crate::downloader::Client;

        struct NoNetwork;

        #[async_trait::async_trait]
        impl Client for NoNetwork {
            async fn fetch(&self, _req: Request) -> Result<Response, ScavengeError> {
                Err(ScavengeError::Http("no network in tests".into()))
            }
        }

        let (req_tx, req_rx) = async_channel::unbounded();
        let (item_tx, item_rx) = async_channel::unbounded();
        Arc::new(Self {
            downloader: Arc::new(Downloader::new(NoNetwork, Vec::new())),
            processor: Arc::new(Processor::default()),
            cfg: Arc::new(Config {
                parallel_downloads: 1,
                parallel_items: 1,
                min_retry_delay: Duration::from_millis(1),
                max_retry_delay: Duration::from_millis(10),
                state_store: None,
                codec: Arc::new(TaggedCodec::new()),
                on_request_fail: None,
                on_spider_fail: None,
                on_item_fail: None,
            }),
            stats: Arc::new(StatCollector::new()),
            token: CancellationToken::new(),
            tracker: WorkTracker::default(),
            req_tx,
            req_rx,
            item_tx,
            item_rx,
            exited_workers: AtomicUsize::new(0),
            total_workers: 2,
        })
    }
}
