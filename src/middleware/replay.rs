//! Response replay: deterministic response substitution keyed by request.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use tracing::debug;

use crate::downloader::{Middleware, RequestMeta, ResponseMeta};
use crate::error::ScavengeError;
use crate::normalize::safe_normalize;
use crate::request::Request;
use crate::response::Response;

use super::ReplayStore;

/// Decides whether a request should be replayed and under what key.
/// Returning `None` opts the request out of replay entirely.
pub type ReplayHandler = Box<dyn Fn(&Request, &RequestMeta) -> Option<String> + Send + Sync>;

/// The default [`ReplayHandler`]: replays GET requests keyed by their
/// safe-normalized URL.
pub fn replay_get_requests(req: &Request, _meta: &RequestMeta) -> Option<String> {
    if req.method != Method::GET {
        return None;
    }
    Some(safe_normalize(&req.url))
}

/// Serves responses from a [`ReplayStore`] and records fresh ones into it.
///
/// A hit on the request phase short-circuits the downloader: the fetch and
/// the response phase are skipped and the stored response is returned as-is.
/// Entries are namespaced by a session identifier so independent runs can
/// share one store.
pub struct Replay {
    session: String,
    store: Arc<dyn ReplayStore>,
    handler: ReplayHandler,
}

impl Replay {
    pub fn new(session: impl Into<String>, store: Arc<dyn ReplayStore>, handler: ReplayHandler) -> Self {
        Self {
            session: session.into(),
            store,
            handler,
        }
    }

    /// A replay middleware using the [`replay_get_requests`] handler.
    pub fn for_get_requests(session: impl Into<String>, store: Arc<dyn ReplayStore>) -> Self {
        Self::new(session, store, Box::new(replay_get_requests))
    }
}

#[async_trait]
impl Middleware for Replay {
    async fn handle_request(
        &self,
        req: &mut Request,
        meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        let Some(key) = (self.handler)(req, meta) else {
            return Ok(None);
        };
        if let Some(res) = self.store.get(&self.session, &key).await {
            debug!(url = %req.url, key, "replaying stored response");
            return Ok(Some(res));
        }
        Ok(None)
    }

    async fn handle_response(
        &self,
        res: &Response,
        meta: &ResponseMeta,
    ) -> Result<(), ScavengeError> {
        if let Some(key) = (self.handler)(res.request(), &meta.request) {
            self.store.set(&self.session, &key, res).await;
        }
        Ok(())
    }
}
