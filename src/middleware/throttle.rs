//! Request pacing, fixed or latency-adaptive.
//!
//! [`Throttle`] delays each request by whatever its [`ThrottleHandler`] asks
//! for. [`AutoThrottle`] is the standard handler, modeled on Scrapy's
//! AutoThrottle extension: it tracks a per-host delay seeded from observed
//! latency and divides it by the target concurrency, so N workers spacing
//! their waits by `delay / N` hit the host with an aggregate cadence of one
//! request per `delay`.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use http::StatusCode;
use tokio::time::sleep;
use url::Url;

use crate::downloader::{Middleware, RequestMeta, ResponseMeta};
use crate::error::ScavengeError;
use crate::request::Request;
use crate::response::Response;

/// Decides how long to wait before a request goes out and observes the
/// responses that come back.
pub trait ThrottleHandler: Send + Sync {
    fn delay(&self, req: &Request, meta: &RequestMeta) -> Duration;
    fn observe(&self, res: &Response, meta: &ResponseMeta);
}

/// Sleeps for `handler.delay(..)` on the request phase and forwards every
/// response to `handler.observe(..)`.
pub struct Throttle {
    handler: Box<dyn ThrottleHandler>,
}

impl Throttle {
    pub fn new(handler: impl ThrottleHandler + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Middleware for Throttle {
    async fn handle_request(
        &self,
        req: &mut Request,
        meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        let delay = self.handler.delay(req, meta);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        Ok(None)
    }

    async fn handle_response(
        &self,
        res: &Response,
        meta: &ResponseMeta,
    ) -> Result<(), ScavengeError> {
        self.handler.observe(res, meta);
        Ok(())
    }
}

/// Latency-adaptive per-host pacing.
///
/// Each host starts at `start_delay`. Every 200 response folds its fetch
/// latency into the host's delay with `delay = (delay + elapsed) / 2`;
/// non-200 responses are ignored so error pages and rate-limit responses do
/// not drag the estimate down. The served delay is
/// `clamp(delay / target_concurrency, min_delay, max_delay)`.
pub struct AutoThrottle {
    start_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
    target_concurrency: u32,
    delays: DashMap<String, Duration>,
}

impl AutoThrottle {
    pub fn new() -> Self {
        Self {
            start_delay: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
            target_concurrency: (num_cpus::get() / 2).max(1) as u32,
            delays: DashMap::new(),
        }
    }

    /// The delay served for a host before any response has been observed.
    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Bounds on the served delay.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn delay_bounds(mut self, min: Duration, max: Duration) -> Self {
        assert!(
            min <= max,
            "auto throttle: min delay {min:?} cannot be greater than max delay {max:?}"
        );
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    /// The number of requests that should hit a host at the same time.
    pub fn target_concurrency(mut self, concurrency: u32) -> Self {
        self.target_concurrency = concurrency.max(1);
        self
    }

    fn host_key(url: &Url) -> String {
        let host = url.host_str().unwrap_or("");
        match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn raw_delay(&self, host: &str) -> Duration {
        self.delays
            .get(host)
            .map(|entry| *entry.value())
            .unwrap_or(self.start_delay)
    }

    fn served_delay(&self, host: &str) -> Duration {
        (self.raw_delay(host) / self.target_concurrency).clamp(self.min_delay, self.max_delay)
    }
}

impl Default for AutoThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleHandler for AutoThrottle {
    fn delay(&self, req: &Request, _meta: &RequestMeta) -> Duration {
        self.served_delay(&Self::host_key(&req.url))
    }

    fn observe(&self, res: &Response, meta: &ResponseMeta) {
        if res.status() != StatusCode::OK {
            return;
        }
        let host = Self::host_key(res.url());
        // Load and store race across workers; values converge regardless.
        let updated = (self.raw_delay(&host) + meta.elapsed) / 2;
        self.delays.insert(host, updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::HeaderMap;

    fn response_with_status(raw: &str, status: StatusCode) -> Response {
        let url = Url::parse(raw).unwrap();
        Response::new(Request::get(url.clone()), status, url, HeaderMap::new(), Vec::new())
    }

    fn meta_with_elapsed(elapsed: Duration) -> ResponseMeta {
        ResponseMeta {
            request: RequestMeta::default(),
            elapsed,
        }
    }

    #[test]
    fn served_delay_converges_to_latency_over_concurrency() {
        let throttle = AutoThrottle::new()
            .start_delay(Duration::from_millis(800))
            .delay_bounds(Duration::ZERO, Duration::from_secs(60))
            .target_concurrency(4);

        let elapsed = Duration::from_millis(200);
        for _ in 0..12 {
            let res = response_with_status("https://example.com/a", StatusCode::OK);
            throttle.observe(&res, &meta_with_elapsed(elapsed));
        }

        let req = Request::get(Url::parse("https://example.com/b").unwrap());
        let served = throttle.delay(&req, &RequestMeta::default());
        let target = elapsed / 4;
        let tolerance = Duration::from_millis(2);
        assert!(
            served >= target.saturating_sub(tolerance) && served <= target + tolerance,
            "served {served:?} should be near {target:?}"
        );
    }

    #[test]
    fn non_200_responses_do_not_move_the_estimate() {
        let throttle = AutoThrottle::new()
            .start_delay(Duration::from_millis(100))
            .target_concurrency(1);

        let res = response_with_status("https://example.com/a", StatusCode::SERVICE_UNAVAILABLE);
        throttle.observe(&res, &meta_with_elapsed(Duration::from_secs(5)));

        let req = Request::get(Url::parse("https://example.com/a").unwrap());
        assert_eq!(throttle.delay(&req, &RequestMeta::default()), Duration::from_millis(100));
    }

    #[test]
    fn served_delay_is_clamped() {
        let throttle = AutoThrottle::new()
            .start_delay(Duration::from_secs(10))
            .delay_bounds(Duration::from_millis(50), Duration::from_millis(500))
            .target_concurrency(1);

        let req = Request::get(Url::parse("https://example.com/").unwrap());
        assert_eq!(throttle.delay(&req, &RequestMeta::default()), Duration::from_millis(500));
    }

    #[test]
    fn hosts_are_tracked_independently() {
        let throttle = AutoThrottle::new().target_concurrency(1);

        let res = response_with_status("https://slow.example/", StatusCode::OK);
        throttle.observe(&res, &meta_with_elapsed(Duration::from_secs(2)));

        let slow = Request::get(Url::parse("https://slow.example/x").unwrap());
        let fast = Request::get(Url::parse("https://fast.example/x").unwrap());
        assert!(throttle.delay(&slow, &RequestMeta::default()) > Duration::ZERO);
        assert_eq!(throttle.delay(&fast, &RequestMeta::default()), Duration::ZERO);
    }
}
