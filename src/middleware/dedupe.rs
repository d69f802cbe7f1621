//! Duplicate-request suppression.

use async_trait::async_trait;
use dashmap::DashSet;
use http::Method;

use crate::downloader::{Middleware, RequestMeta};
use crate::error::ScavengeError;
use crate::normalize::safe_normalize;
use crate::request::Request;
use crate::response::Response;

/// Drops duplicate GET requests. Requests are compared by their
/// safe-normalized URL; the first one through wins and later duplicates fail
/// with a [`Dropped`](ScavengeError::Dropped) error. Non-GET requests and
/// retries pass through untouched, so a retried request never collides with
/// its own first attempt.
#[derive(Default)]
pub struct Dedupe {
    seen: DashSet<String>,
}

impl Dedupe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Middleware for Dedupe {
    async fn handle_request(
        &self,
        req: &mut Request,
        meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        if req.method != Method::GET || meta.attempt > 0 {
            return Ok(None);
        }
        let normalized = safe_normalize(&req.url);
        if !self.seen.insert(normalized.clone()) {
            return Err(ScavengeError::dropped(format!(
                "duplicate request: GET {normalized}"
            )));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use url::Url;

    fn get(raw: &str) -> Request {
        Request::get(Url::parse(raw).unwrap())
    }

    #[tokio::test]
    async fn second_equivalent_get_is_dropped() {
        let mw = Dedupe::new();
        let meta = RequestMeta::default();

        let mut first = get("https://example.com/x");
        assert!(mw.handle_request(&mut first, &meta).await.is_ok());

        // Differs only in host case, which normalization erases.
        let mut second = get("https://EXAMPLE.com/x");
        let err = mw.handle_request(&mut second, &meta).await.unwrap_err();
        assert!(err.is_dropped());
        assert!(err.to_string().contains("https://example.com/x"));
    }

    #[tokio::test]
    async fn retries_and_non_gets_pass_through() {
        let mw = Dedupe::new();

        let mut first = get("https://example.com/x");
        mw.handle_request(&mut first, &RequestMeta::default())
            .await
            .unwrap();

        let retry_meta = RequestMeta {
            referer: None,
            attempt: 1,
        };
        let mut retried = get("https://example.com/x");
        assert!(mw
            .handle_request(&mut retried, &retry_meta)
            .await
            .unwrap()
            .is_none());

        let mut post = Request::post(Url::parse("https://example.com/x").unwrap());
        assert!(mw
            .handle_request(&mut post, &RequestMeta::default())
            .await
            .unwrap()
            .is_none());
        let mut post_again = Request::post(Url::parse("https://example.com/x").unwrap());
        assert!(mw
            .handle_request(&mut post_again, &RequestMeta::default())
            .await
            .unwrap()
            .is_none());
    }
}
