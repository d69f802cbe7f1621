//! The [`Request`] value object.
//!
//! A request is a plain HTTP message container plus an ordered bag of typed
//! metadata. Middlewares mutate requests in place while they hold them; once
//! a request has been handed to the client it belongs to the response.

use std::fmt;

use http::header::CONTENT_TYPE;
use parking_lot::Mutex;
use http::{HeaderMap, HeaderValue, Method};
use tokio::io::AsyncRead;
use url::Url;

use crate::item::Record;

/// A read-once streaming body source.
pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// An HTTP request. Not concurrency-safe; owned by whoever last handed it
/// off.
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,

    /// Set to true to keep the response body as a stream instead of reading
    /// it into memory. See [`Response::take_stream`](crate::Response::take_stream).
    pub stream_response: bool,

    // Read-once; consumed by the client on the first delivery attempt and
    // excluded from clones and state snapshots.
    stream_body: Mutex<Option<BodyStream>>,

    meta: Vec<Box<dyn Record>>,
}

impl Request {
    /// Creates a request with no headers, body, or metadata.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Vec::new(),
            stream_response: false,
            stream_body: Mutex::new(None),
            meta: Vec::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn patch(url: Url) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Sets a header, replacing any previous values for the name.
    pub fn set_header(&mut self, name: http::header::HeaderName, value: &str) -> &mut Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the `Content-Type` header.
    pub fn set_content_type(&mut self, mimetype: &str) -> &mut Self {
        self.set_header(CONTENT_TYPE, mimetype)
    }

    /// Sets the body bytes and content type.
    pub fn set_body(&mut self, mimetype: &str, body: Vec<u8>) -> &mut Self {
        self.set_content_type(mimetype);
        self.body = body;
        self
    }

    /// Sets the body to a JSON document.
    pub fn set_body_json(&mut self, json: &str) -> &mut Self {
        self.set_body("application/json", json.as_bytes().to_vec())
    }

    /// Sets the body to an `application/x-www-form-urlencoded` form.
    pub fn set_body_form<'a>(
        &mut self,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> &mut Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.set_body("application/x-www-form-urlencoded", encoded.into_bytes())
    }

    /// Pipes a reader directly into the request body, bypassing the byte
    /// buffer. The stream is consumed by the first delivery attempt; requests
    /// carrying one are skipped when scraping state is suspended.
    pub fn set_stream_body(&mut self, body: BodyStream) -> &mut Self {
        *self.stream_body.lock() = Some(body);
        self
    }

    /// Takes the streaming body source, if any. Subsequent calls return
    /// `None`.
    pub fn take_stream_body(&self) -> Option<BodyStream> {
        self.stream_body.lock().take()
    }

    /// Whether a streaming body source is currently attached.
    pub fn has_stream_body(&self) -> bool {
        self.stream_body.lock().is_some()
    }

    /// Appends a value to the request metadata.
    pub fn add_meta<T: Record>(&mut self, value: T) -> &mut Self {
        self.meta.push(Box::new(value));
        self
    }

    /// Returns the first metadata value whose concrete type is exactly `T`.
    pub fn meta<T: Record>(&self) -> Option<&T> {
        self.meta
            .iter()
            .find_map(|v| v.as_any().downcast_ref::<T>())
    }

    /// Returns every metadata value whose concrete type is exactly `T`.
    pub fn meta_all<T: Record>(&self) -> Vec<&T> {
        self.meta
            .iter()
            .filter_map(|v| v.as_any().downcast_ref::<T>())
            .collect()
    }

    /// Iterates the metadata values in insertion order.
    pub fn meta_iter(&self) -> impl Iterator<Item = &dyn Record> {
        self.meta.iter().map(|v| v.as_ref())
    }

    pub(crate) fn meta_values(&self) -> &[Box<dyn Record>] {
        &self.meta
    }

    pub(crate) fn push_meta_boxed(&mut self, value: Box<dyn Record>) {
        self.meta.push(value);
    }
}

impl Clone for Request {
    // The streaming body is read-once and cannot be duplicated; clones start
    // without one.
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            stream_response: self.stream_response,
            stream_body: Mutex::new(None),
            meta: self.meta.clone(),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("stream_response", &self.stream_response)
            .field("meta", &self.meta)
            .finish()
    }
}
