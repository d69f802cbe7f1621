//! Built-in downloader middlewares.
//!
//! Each middleware lives in its own module and implements
//! [`Middleware`](crate::downloader::Middleware). They compose in
//! registration order, so put cheap policy filters (domains, dedupe) before
//! the ones that spend time or money (replay, throttle).

mod allowed_domains;
mod cookies;
mod dedupe;
mod headers;
mod referer;
mod replay;
mod replay_store;
mod throttle;

pub use allowed_domains::AllowedDomains;
pub use cookies::Cookies;
pub use dedupe::Dedupe;
pub use headers::Headers;
pub use referer::Referer;
pub use replay::{replay_get_requests, Replay, ReplayHandler};
pub use replay_store::{FsReplayStore, MemoryReplayStore, ReplayStore};
pub use throttle::{AutoThrottle, Throttle, ThrottleHandler};
