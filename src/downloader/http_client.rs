//! The default [`Client`] implementation, backed by `reqwest`.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::error::ScavengeError;
use crate::request::Request;
use crate::response::Response;

use super::Client;

/// A [`Client`] that sends requests through a shared [`reqwest::Client`].
///
/// Redirects, TLS, connection pooling, and timeouts are whatever the inner
/// client was built with; compose those through [`reqwest::ClientBuilder`].
#[derive(Default, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn fetch(&self, req: Request) -> Result<Response, ScavengeError> {
        let mut builder = self
            .client
            .request(req.method.clone(), req.url.clone())
            .headers(req.headers.clone());

        builder = match req.take_stream_body() {
            Some(stream) => builder.body(reqwest::Body::wrap_stream(ReaderStream::new(stream))),
            None => builder.body(req.body.clone()),
        };

        let res = builder
            .send()
            .await
            .map_err(|err| ScavengeError::Http(err.to_string()))?;

        let status = res.status();
        let final_url = res.url().clone();
        let headers = res.headers().clone();

        if req.stream_response {
            let stream = Box::pin(
                res.bytes_stream()
                    .map_err(|err| std::io::Error::other(err.to_string())),
            );
            return Ok(Response::with_stream(
                req,
                status,
                final_url,
                headers,
                Box::new(StreamReader::new(stream)),
            ));
        }

        let body = res
            .bytes()
            .await
            .map_err(|err| ScavengeError::Http(format!("read body: {err}")))?;
        Ok(Response::new(req, status, final_url, headers, body.to_vec()))
    }
}
