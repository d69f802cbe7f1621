//! Fixed request headers.

use async_trait::async_trait;
use http::HeaderMap;

use crate::downloader::{Middleware, RequestMeta};
use crate::error::ScavengeError;
use crate::request::Request;
use crate::response::Response;

/// Overwrites the configured headers on every request, replacing any values
/// already present for the same names.
pub struct Headers {
    headers: HeaderMap,
}

impl Headers {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl Middleware for Headers {
    async fn handle_request(
        &self,
        req: &mut Request,
        _meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        for name in self.headers.keys() {
            req.headers.remove(name);
            for value in self.headers.get_all(name) {
                req.headers.append(name.clone(), value.clone());
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::header::{HeaderValue, ACCEPT, USER_AGENT};
    use url::Url;

    #[tokio::test]
    async fn overwrites_existing_values_and_keeps_multi_values() {
        let mut fixed = HeaderMap::new();
        fixed.insert(USER_AGENT, HeaderValue::from_static("scavenge/0.1"));
        fixed.append(ACCEPT, HeaderValue::from_static("text/html"));
        fixed.append(ACCEPT, HeaderValue::from_static("application/json"));
        let mw = Headers::new(fixed);

        let mut req = Request::get(Url::parse("https://example.com").unwrap());
        req.set_header(USER_AGENT, "something-else");

        mw.handle_request(&mut req, &RequestMeta::default())
            .await
            .unwrap();

        assert_eq!(req.headers.get(USER_AGENT).unwrap(), "scavenge/0.1");
        let accepts: Vec<_> = req.headers.get_all(ACCEPT).iter().collect();
        assert_eq!(accepts, vec!["text/html", "application/json"]);
    }
}
