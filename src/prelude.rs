//! A "prelude" for users of the `scavenge` crate.
//!
//! ```
//! use scavenge::prelude::*;
//! ```

pub use crate::{
    async_trait, CancellationToken, Client, Downloader, HttpClient, Item, Middleware, Navigator,
    Pipeline, Processor, Record, Request, RequestMeta, Response, ResponseMeta, ScavengeError,
    Scavenger, Spider, Url,
};

pub use crate::middleware::{
    AllowedDomains, AutoThrottle, Cookies, Dedupe, Headers, Referer, Replay, Throttle,
};
