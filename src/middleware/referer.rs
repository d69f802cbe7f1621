//! `Referer` header propagation.

use async_trait::async_trait;
use http::header::REFERER;
use http::HeaderValue;

use crate::downloader::{Middleware, RequestMeta};
use crate::error::ScavengeError;
use crate::request::Request;
use crate::response::Response;

/// Sets the `Referer` header from the scheduling metadata, so requests
/// enqueued through a [`Navigator`](crate::Navigator) carry the page they
/// were discovered on. A header set explicitly on the request is left alone.
#[derive(Default)]
pub struct Referer;

impl Referer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Referer {
    async fn handle_request(
        &self,
        req: &mut Request,
        meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        if req.headers.contains_key(REFERER) {
            return Ok(None);
        }
        if let Some(referer) = &meta.referer {
            if let Ok(value) = HeaderValue::from_str(referer.as_str()) {
                req.headers.insert(REFERER, value);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use url::Url;

    #[tokio::test]
    async fn sets_referer_from_meta_without_clobbering() {
        let mw = Referer::new();
        let meta = RequestMeta {
            referer: Some(Url::parse("https://example.com/index").unwrap()),
            attempt: 0,
        };

        let mut req = Request::get(Url::parse("https://example.com/a").unwrap());
        mw.handle_request(&mut req, &meta).await.unwrap();
        assert_eq!(
            req.headers.get(REFERER).unwrap(),
            "https://example.com/index"
        );

        let mut explicit = Request::get(Url::parse("https://example.com/b").unwrap());
        explicit.set_header(REFERER, "https://other.example/");
        mw.handle_request(&mut explicit, &meta).await.unwrap();
        assert_eq!(
            explicit.headers.get(REFERER).unwrap(),
            "https://other.example/"
        );
    }
}
