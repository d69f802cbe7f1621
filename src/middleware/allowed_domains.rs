//! Hostname allow-listing for requests and responses.

use async_trait::async_trait;

use crate::downloader::{Middleware, RequestMeta, ResponseMeta};
use crate::error::ScavengeError;
use crate::request::Request;
use crate::response::Response;

/// Limits the domains of outgoing requests and incoming responses, each
/// against its own pattern list. An empty list allows everything.
///
/// Patterns use a domain glob dialect: `*` matches any run of characters
/// except `.`, so `*.wikipedia.org` matches `en.wikipedia.org` but not
/// `a.b.wikipedia.org`. Requests and responses whose hostname matches no
/// pattern fail with a [`Dropped`](ScavengeError::Dropped) error.
pub struct AllowedDomains {
    request_domains: Vec<DomainPattern>,
    response_domains: Vec<DomainPattern>,
}

impl AllowedDomains {
    pub fn new<S: AsRef<str>>(for_requests: &[S], for_responses: &[S]) -> Self {
        Self {
            request_domains: for_requests.iter().map(DomainPattern::new).collect(),
            response_domains: for_responses.iter().map(DomainPattern::new).collect(),
        }
    }

    /// Applies the same pattern list to both requests and responses.
    pub fn both<S: AsRef<str>>(domains: &[S]) -> Self {
        Self::new(domains, domains)
    }
}

#[async_trait]
impl Middleware for AllowedDomains {
    async fn handle_request(
        &self,
        req: &mut Request,
        _meta: &RequestMeta,
    ) -> Result<Option<Response>, ScavengeError> {
        if self.request_domains.is_empty() {
            return Ok(None);
        }
        let hostname = req.url.host_str().unwrap_or("");
        if !self.request_domains.iter().any(|p| p.matches(hostname)) {
            return Err(ScavengeError::dropped(format!(
                "allowed domains: aborting request to '{}', domain '{hostname}' is not allowed",
                req.url,
            )));
        }
        Ok(None)
    }

    async fn handle_response(
        &self,
        res: &Response,
        _meta: &ResponseMeta,
    ) -> Result<(), ScavengeError> {
        if self.response_domains.is_empty() {
            return Ok(());
        }
        let hostname = res.url().host_str().unwrap_or("");
        if !self.response_domains.iter().any(|p| p.matches(hostname)) {
            return Err(ScavengeError::dropped(format!(
                "allowed domains: response from domain '{hostname}' (for a request to '{}') is not allowed",
                res.request().url,
            )));
        }
        Ok(())
    }
}

struct DomainPattern(String);

impl DomainPattern {
    fn new(pattern: impl AsRef<str>) -> Self {
        Self(pattern.as_ref().to_ascii_lowercase())
    }

    // Wildcard match where '*' never crosses a '.' separator. Iterative with
    // single-star backtracking.
    fn matches(&self, hostname: &str) -> bool {
        let p = self.0.as_bytes();
        let t = hostname.as_bytes();
        let (mut pi, mut ti) = (0usize, 0usize);
        let mut star: Option<usize> = None;
        let mut mark = 0usize;

        while ti < t.len() {
            if pi < p.len() && p[pi] == b'*' {
                star = Some(pi);
                mark = ti;
                pi += 1;
            } else if pi < p.len() && p[pi].eq_ignore_ascii_case(&t[ti]) {
                pi += 1;
                ti += 1;
            } else if let Some(s) = star {
                if t[mark] == b'.' {
                    return false;
                }
                mark += 1;
                ti = mark;
                pi = s + 1;
            } else {
                return false;
            }
        }

        while pi < p.len() && p[pi] == b'*' {
            pi += 1;
        }
        pi == p.len()
    }
}
