//! The [`Response`] value object.

use std::fmt;

use http::header::CONTENT_TYPE;
use parking_lot::Mutex;
use http::{HeaderMap, StatusCode};
use scraper::Html;
use url::Url;

use crate::error::ScavengeError;
use crate::request::{BodyStream, Request};

/// An HTTP response. Immutable after construction.
pub struct Response {
    request: Request,
    status: StatusCode,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    stream: Mutex<Option<BodyStream>>,
}

impl Response {
    /// Creates a response with a fully buffered body.
    pub fn new(
        request: Request,
        status: StatusCode,
        url: Url,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Self {
        Self {
            request,
            status,
            url,
            headers,
            body,
            stream: Mutex::new(None),
        }
    }

    /// Creates a response whose body is delivered as a one-shot stream.
    /// Produced by clients when the request set
    /// [`stream_response`](crate::Request::stream_response).
    pub fn with_stream(
        request: Request,
        status: StatusCode,
        url: Url,
        headers: HeaderMap,
        stream: BodyStream,
    ) -> Self {
        Self {
            request,
            status,
            url,
            headers,
            body: Vec::new(),
            stream: Mutex::new(Some(stream)),
        }
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The final URL, after any redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The mimetype from the `Content-Type` header, if present and valid.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// The raw body bytes. Empty for streaming responses.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body interpreted as UTF-8 text.
    pub fn text(&self) -> Result<&str, ScavengeError> {
        std::str::from_utf8(&self.body)
            .map_err(|err| ScavengeError::Message(format!("response body is not utf-8: {err}")))
    }

    /// The body parsed as JSON into `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ScavengeError> {
        serde_json::from_slice(&self.body)
            .map_err(|err| ScavengeError::Message(format!("parse json body: {err}")))
    }

    /// The body parsed as an HTML document.
    pub fn html(&self) -> Result<Html, ScavengeError> {
        Ok(Html::parse_document(self.text()?))
    }

    /// Takes the one-shot body stream, if the request asked for one.
    /// Subsequent calls return `None`. Middlewares should leave this alone;
    /// it cannot be read twice.
    pub fn take_stream(&self) -> Option<BodyStream> {
        self.stream.lock().take()
    }
}

impl Clone for Response {
    // The body stream is read-once; clones carry only the buffered bytes.
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            status: self.status,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            stream: Mutex::new(None),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status.as_u16())
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_body(body: &[u8]) -> Response {
        let url = Url::parse("https://example.com/page").unwrap();
        Response::new(
            Request::get(url.clone()),
            StatusCode::OK,
            url,
            HeaderMap::new(),
            body.to_vec(),
        )
    }

    #[test]
    fn json_body_deserializes() {
        let res = response_with_body(br#"{"name":"x","count":3}"#);

        #[derive(serde::Deserialize)]
        struct Payload {
            name: String,
            count: u32,
        }

        let payload: Payload = res.json().unwrap();
        assert_eq!(payload.name, "x");
        assert_eq!(payload.count, 3);
    }

    #[test]
    fn html_body_parses_anchors() {
        let res = response_with_body(b"<html><body><a href='/next'>next</a></body></html>");
        let doc = res.html().unwrap();
        let selector = scraper::Selector::parse("a").unwrap();
        let anchor = doc.select(&selector).next().unwrap();
        assert_eq!(anchor.value().attr("href"), Some("/next"));
    }
}
