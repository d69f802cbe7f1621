//! The [`Spider`] trait: where the business logic of a scrape lives.

use async_trait::async_trait;

use crate::error::ScavengeError;
use crate::navigator::Navigator;
use crate::request::Request;
use crate::response::Response;

/// User-supplied scraping logic: which pages to start from, and what to do
/// with each page that comes back.
///
/// `handle_response` is invoked from every download worker, so it must be
/// safe for parallel invocation; if that is impractical, build the engine
/// with `parallel_downloads(1)`. New requests and items are emitted through
/// the [`Navigator`] rather than returned, so a handler can keep working
/// while the engine already dispatches what it found.
///
/// ```rust,ignore
/// struct Docs;
///
/// #[async_trait]
/// impl Spider for Docs {
///     fn starting_requests(&self) -> Vec<Request> {
///         vec![Request::get(Url::parse("https://docs.example/index").unwrap())]
///     }
///
///     async fn handle_response(
///         &self,
///         nav: &Navigator,
///         res: &Response,
///     ) -> Result<(), ScavengeError> {
///         let doc = res.html()?;
///         let links = Selector::parse("a.chapter").unwrap();
///         for anchor in doc.select(&links) {
///             nav.request(nav.anchor_request(&anchor)?);
///         }
///         nav.save_item(Chapter::from(doc));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Spider: Send + Sync {
    /// The requests the scrape begins with. Ignored when a run resumes from
    /// a saved snapshot.
    fn starting_requests(&self) -> Vec<Request>;

    /// Handles one downloaded response.
    async fn handle_response(&self, nav: &Navigator, res: &Response) -> Result<(), ScavengeError>;
}
