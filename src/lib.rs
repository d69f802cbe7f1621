//! # scavenge
//!
//! A concurrent web-scraping engine. You supply a [`Spider`] with the
//! business logic of following links and extracting structured data; the
//! engine supplies the rest: parallel download and item workers, a middleware
//! pipeline around the HTTP client (domain filtering, deduplication,
//! cookies, response replay, adaptive throttling), retries with jittered
//! exponential backoff, and best-effort suspend/resume of pending work.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scavenge::prelude::*;
//!
//! struct Wiki;
//!
//! #[async_trait]
//! impl Spider for Wiki {
//!     fn starting_requests(&self) -> Vec<Request> {
//!         vec![Request::get(Url::parse("https://en.wikipedia.org/wiki/Web_scraping").unwrap())]
//!     }
//!
//!     async fn handle_response(&self, nav: &Navigator, res: &Response) -> Result<(), ScavengeError> {
//!         let doc = res.html()?;
//!         let links = Selector::parse("a").unwrap();
//!         for anchor in doc.select(&links) {
//!             if let Ok(req) = nav.anchor_request(&anchor) {
//!                 nav.request(req);
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! async fn scrape() -> Result<(), ScavengeError> {
//!     let downloader = Downloader::new(
//!         HttpClient::default(),
//!         vec![
//!             Box::new(AllowedDomains::both(&["*.wikipedia.org"])),
//!             Box::new(Dedupe::new()),
//!             Box::new(Throttle::new(AutoThrottle::new())),
//!         ],
//!     );
//!     let scavenger = Scavenger::builder(downloader, Processor::default()).build()?;
//!     scavenger.run(CancellationToken::new(), Arc::new(Wiki)).await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod downloader;
pub mod error;
pub mod item;
pub mod middleware;
pub mod navigator;
pub mod normalize;
pub mod pipeline;
pub mod prelude;
pub mod request;
pub mod response;
pub mod scavenger;
pub mod spider;
pub mod state;
pub mod stats;

pub use codec::{MetaCodec, TaggedCodec};
pub use downloader::{Client, Downloader, HttpClient, Middleware, RequestMeta, ResponseMeta};
pub use error::ScavengeError;
pub use item::{Item, Record};
pub use navigator::Navigator;
pub use pipeline::{Pipeline, Processor};
pub use request::Request;
pub use response::Response;
pub use scavenger::{Scavenger, ScavengerBuilder};
pub use spider::Spider;
pub use state::{FileStateStore, StateStore};
pub use stats::StatCollector;

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
pub use url::Url;
