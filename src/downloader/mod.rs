//! The downloader: an HTTP client wrapped in a two-phase middleware chain.
//!
//! [`Downloader::download`] runs the request phase in registration order,
//! performs the fetch, then runs the response phase in the same order. A
//! request-phase middleware may return a response of its own, which both
//! skips the remaining request middlewares and bypasses the fetch and the
//! whole response phase; the replay cache uses this to serve hits without
//! paying for post-processing. Ordering also lets cheap policy middlewares
//! (domain filter, dedupe) gate the expensive ones (throttle, fetch).

mod http_client;

pub use http_client::HttpClient;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::error::ScavengeError;
use crate::request::Request;
use crate::response::Response;

/// Context handed to request-phase middlewares.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// URL of the page the request was discovered on, if any.
    pub referer: Option<Url>,
    /// 0 for the first try; incremented by the scheduler on each retry.
    pub attempt: u32,
}

/// Context handed to response-phase middlewares.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub request: RequestMeta,
    /// Wall time spent inside the client fetch.
    pub elapsed: Duration,
}

/// A single-shot HTTP fetcher.
#[async_trait]
pub trait Client: Send + Sync {
    async fn fetch(&self, req: Request) -> Result<Response, ScavengeError>;
}

#[async_trait]
impl<T: Client + ?Sized> Client for std::sync::Arc<T> {
    async fn fetch(&self, req: Request) -> Result<Response, ScavengeError> {
        self.as_ref().fetch(req).await
    }
}

/// An interceptor with request-phase and response-phase hooks. Both default
/// to no-ops so implementations only write the phase they care about.
///
/// Returning an error from either hook aborts the request; the scheduler
/// retries it unless the error is classified
/// [`Dropped`](ScavengeError::Dropped).
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle_request(
        &self,
        req: &mut Request,
        meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        let _ = (req, meta);
        Ok(None)
    }

    async fn handle_response(
        &self,
        res: &Response,
        meta: &ResponseMeta,
    ) -> Result<(), ScavengeError> {
        let _ = (res, meta);
        Ok(())
    }
}

#[async_trait]
impl<T: Middleware + ?Sized> Middleware for std::sync::Arc<T> {
    async fn handle_request(
        &self,
        req: &mut Request,
        meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        self.as_ref().handle_request(req, meta).await
    }

    async fn handle_response(
        &self,
        res: &Response,
        meta: &ResponseMeta,
    ) -> Result<(), ScavengeError> {
        self.as_ref().handle_response(res, meta).await
    }
}

/// An HTTP client wrapped in middleware.
pub struct Downloader {
    client: Box<dyn Client>,
    middleware: Vec<Box<dyn Middleware>>,
}

impl Downloader {
    pub fn new(client: impl Client + 'static, middleware: Vec<Box<dyn Middleware>>) -> Self {
        Self {
            client: Box::new(client),
            middleware,
        }
    }

    /// Fetches `req` through the middleware chain.
    pub async fn download(
        &self,
        mut req: Request,
        meta: &RequestMeta,
    ) -> Result<Response, ScavengeError> {
        for mid in &self.middleware {
            let shortcut = mid
                .handle_request(&mut req, meta)
                .await
                .map_err(|err| ScavengeError::RequestMiddleware(Box::new(err)))?;
            if let Some(res) = shortcut {
                return Ok(res);
            }
        }

        let started = Instant::now();
        let res = self.client.fetch(req).await.map_err(|err| match err {
            err @ ScavengeError::Http(_) => err,
            other => ScavengeError::Http(other.to_string()),
        })?;
        let elapsed = started.elapsed();

        let res_meta = ResponseMeta {
            request: meta.clone(),
            elapsed,
        };
        for mid in &self.middleware {
            mid.handle_response(&res, &res_meta)
                .await
                .map_err(|err| ScavengeError::ResponseMiddleware(Box::new(err)))?;
        }

        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use http::{HeaderMap, StatusCode};

    struct CountingClient {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Client for CountingClient {
        async fn fetch(&self, req: Request) -> Result<Response, ScavengeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let url = req.url.clone();
            Ok(Response::new(
                req,
                StatusCode::OK,
                url,
                HeaderMap::new(),
                Vec::new(),
            ))
        }
    }

    #[derive(Default)]
    struct Probe {
        requests: AtomicUsize,
        responses: AtomicUsize,
        serve: bool,
    }

    #[async_trait]
    impl Middleware for Arc<Probe> {
        async fn handle_request(
            &self,
            req: &mut Request,
            _meta: &RequestMeta,
        ) -> Result<Option<Response>, ScavengeError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.serve {
                let url = req.url.clone();
                return Ok(Some(Response::new(
                    req.clone(),
                    StatusCode::OK,
                    url,
                    HeaderMap::new(),
                    b"served".to_vec(),
                )));
            }
            Ok(None)
        }

        async fn handle_response(
            &self,
            _res: &Response,
            _meta: &ResponseMeta,
        ) -> Result<(), ScavengeError> {
            self.responses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request() -> Request {
        Request::get(Url::parse("https://example.com/a").unwrap())
    }

    #[tokio::test]
    async fn short_circuit_skips_fetch_and_response_phase() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let first = Arc::new(Probe {
            serve: true,
            ..Probe::default()
        });
        let second = Arc::new(Probe::default());

        let downloader = Downloader::new(
            CountingClient {
                fetches: fetches.clone(),
            },
            vec![Box::new(first.clone()), Box::new(second.clone())],
        );

        let res = downloader
            .download(request(), &RequestMeta::default())
            .await
            .unwrap();

        assert_eq!(res.body(), b"served");
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert_eq!(second.requests.load(Ordering::SeqCst), 0);
        assert_eq!(first.responses.load(Ordering::SeqCst), 0);
        assert_eq!(second.responses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn both_phases_run_in_registration_order() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let probe = Arc::new(Probe::default());

        let downloader = Downloader::new(
            CountingClient {
                fetches: fetches.clone(),
            },
            vec![Box::new(probe.clone())],
        );

        downloader
            .download(request(), &RequestMeta::default())
            .await
            .unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(probe.requests.load(Ordering::SeqCst), 1);
        assert_eq!(probe.responses.load(Ordering::SeqCst), 1);
    }

    struct Failing;

    #[async_trait]
    impl Middleware for Failing {
        async fn handle_request(
            &self,
            _req: &mut Request,
            _meta: &RequestMeta,
        ) -> Result<Option<Response>, ScavengeError> {
            Err(ScavengeError::dropped("not allowed"))
        }
    }

    #[tokio::test]
    async fn middleware_errors_are_wrapped_and_keep_their_class() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let downloader = Downloader::new(
            CountingClient {
                fetches: fetches.clone(),
            },
            vec![Box::new(Failing)],
        );

        let err = downloader
            .download(request(), &RequestMeta::default())
            .await
            .unwrap_err();

        assert!(err.is_dropped());
        assert!(err.to_string().starts_with("req middleware:"));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }
}
