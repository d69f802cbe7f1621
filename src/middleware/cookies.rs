//! Cookie persistence across requests.

use std::sync::Arc;

use async_trait::async_trait;
use cookie::Cookie;
use cookie_store::CookieStore;
use http::header::{COOKIE, SET_COOKIE};
use http::HeaderValue;
use parking_lot::RwLock;
use tracing::warn;

use crate::downloader::{Middleware, RequestMeta, ResponseMeta};
use crate::error::ScavengeError;
use crate::request::Request;
use crate::response::Response;

/// A shared cookie jar. On the request phase it attaches the cookies stored
/// for the target URL; on the response phase it parses `Set-Cookie` headers
/// and stores them keyed by the response URL.
pub struct Cookies {
    jar: Arc<RwLock<CookieStore>>,
}

impl Cookies {
    pub fn new() -> Self {
        Self {
            jar: Arc::new(RwLock::new(CookieStore::default())),
        }
    }

    /// Uses an existing jar, e.g. one preloaded with session cookies.
    pub fn with_jar(jar: Arc<RwLock<CookieStore>>) -> Self {
        Self { jar }
    }

    pub fn jar(&self) -> Arc<RwLock<CookieStore>> {
        Arc::clone(&self.jar)
    }
}

impl Default for Cookies {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for Cookies {
    async fn handle_request(
        &self,
        req: &mut Request,
        _meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        let header = {
            let jar = self.jar.read();
            jar.get_request_values(&req.url)
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ")
        };
        if !header.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&header) {
                req.headers.insert(COOKIE, value);
            }
        }
        Ok(None)
    }

    async fn handle_response(
        &self,
        res: &Response,
        _meta: &ResponseMeta,
    ) -> Result<(), ScavengeError> {
        let mut parsed = Vec::new();
        for value in res.headers().get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                warn!(url = %res.url(), "skipping non-utf8 set-cookie header");
                continue;
            };
            match Cookie::parse(raw.to_owned()) {
                Ok(cookie) => parsed.push(cookie),
                Err(err) => {
                    warn!(url = %res.url(), %err, "failed to parse set-cookie header");
                }
            }
        }
        if !parsed.is_empty() {
            self.jar
                .write()
                .store_response_cookies(parsed.into_iter(), res.url());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::{HeaderMap, StatusCode};
    use std::time::Duration;
    use url::Url;

    #[tokio::test]
    async fn cookies_set_by_a_response_are_sent_on_later_requests() {
        let mw = Cookies::new();
        let url = Url::parse("https://example.com/login").unwrap();

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("session=abc; Path=/"));
        let res = Response::new(
            Request::get(url.clone()),
            StatusCode::OK,
            url.clone(),
            headers,
            Vec::new(),
        );
        let meta = ResponseMeta {
            request: RequestMeta::default(),
            elapsed: Duration::ZERO,
        };
        mw.handle_response(&res, &meta).await.unwrap();

        let mut next = Request::get(Url::parse("https://example.com/account").unwrap());
        mw.handle_request(&mut next, &RequestMeta::default())
            .await
            .unwrap();
        assert_eq!(next.headers.get(COOKIE).unwrap(), "session=abc");
    }

    #[tokio::test]
    async fn cookies_do_not_leak_across_domains() {
        let mw = Cookies::new();
        let url = Url::parse("https://example.com/").unwrap();

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("session=abc"));
        let res = Response::new(
            Request::get(url.clone()),
            StatusCode::OK,
            url,
            headers,
            Vec::new(),
        );
        let meta = ResponseMeta {
            request: RequestMeta::default(),
            elapsed: Duration::ZERO,
        };
        mw.handle_response(&res, &meta).await.unwrap();

        let mut other = Request::get(Url::parse("https://other.example/").unwrap());
        mw.handle_request(&mut other, &RequestMeta::default())
            .await
            .unwrap();
        assert!(other.headers.get(COOKIE).is_none());
    }
}
