//! The [`Navigator`]: how a spider hands work back to the engine.

use scraper::ElementRef;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ScavengeError;
use crate::item::Record;
use crate::request::Request;
use crate::scavenger::RunContext;

use std::sync::Arc;

/// A facade bound to a single response-handling invocation. It knows the URL
/// the response landed on, so requests enqueued through it carry the right
/// referer and relative links resolve against the right base.
///
/// Enqueueing never blocks the handler; jobs are accounted for immediately
/// and dispatched by the worker pools.
pub struct Navigator {
    ctx: Arc<RunContext>,
    current_url: Url,
}

impl Navigator {
    pub(crate) fn new(ctx: Arc<RunContext>, current_url: Url) -> Self {
        Self { ctx, current_url }
    }

    /// The cancellation token driving the run. Handlers doing their own slow
    /// work should watch it.
    pub fn token(&self) -> &CancellationToken {
        &self.ctx.token
    }

    /// The final URL of the response being handled.
    pub fn current_url(&self) -> &Url {
        &self.current_url
    }

    /// Queues a value for item processing, wrapped in a one-element
    /// [`Item`](crate::Item).
    pub fn save_item<T: Record>(&self, value: T) {
        self.ctx.queue_item(crate::item::Item::of(value), 0);
    }

    /// Queues a request with the current URL as its referer.
    pub fn request(&self, req: Request) {
        self.ctx
            .queue_request(req, Some(self.current_url.clone()), 0);
    }

    /// Queues a GET request to `url` with the current URL as the referer.
    /// The URL is used as given; it is not resolved against the current URL.
    pub fn follow_url(&self, url: Url) {
        self.request(Request::get(url));
    }

    /// Resolves the `href` of an anchor element against the current URL.
    pub fn anchor_url(&self, anchor: &ElementRef<'_>) -> Result<Url, ScavengeError> {
        let element = anchor.value();
        if element.name() != "a" {
            return Err(ScavengeError::msg(format!(
                "follow anchor: element '{}' is not an <a> tag",
                element.name()
            )));
        }
        let href = element.attr("href").filter(|href| !href.is_empty()).ok_or_else(|| {
            ScavengeError::msg(format!(
                "follow anchor: no href on <a> tag '{}'",
                anchor.html()
            ))
        })?;
        self.current_url
            .join(href)
            .map_err(|err| ScavengeError::msg(format!("follow anchor: {err}")))
    }

    /// Builds a GET request from an anchor element, resolving its `href`
    /// against the current URL.
    pub fn anchor_request(&self, anchor: &ElementRef<'_>) -> Result<Request, ScavengeError> {
        Ok(Request::get(self.anchor_url(anchor)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use scraper::{Html, Selector};

    fn navigator() -> Navigator {
        Navigator::new(
            RunContext::for_tests(),
            Url::parse("https://example.com/section/index.html").unwrap(),
        )
    }

    fn first<'a>(doc: &'a Html, selector: &Selector) -> ElementRef<'a> {
        doc.select(selector).next().unwrap()
    }

    #[test]
    fn anchor_urls_resolve_relative_hrefs() {
        let nav = navigator();
        let doc = Html::parse_fragment("<a href='../other/page.html'>x</a>");
        let selector = Selector::parse("a").unwrap();

        let url = nav.anchor_url(&first(&doc, &selector)).unwrap();
        assert_eq!(url.as_str(), "https://example.com/other/page.html");
    }

    #[test]
    fn anchor_urls_keep_absolute_hrefs() {
        let nav = navigator();
        let doc = Html::parse_fragment("<a href='https://other.example/x'>x</a>");
        let selector = Selector::parse("a").unwrap();

        let url = nav.anchor_url(&first(&doc, &selector)).unwrap();
        assert_eq!(url.as_str(), "https://other.example/x");
    }

    #[test]
    fn non_anchor_elements_are_rejected() {
        let nav = navigator();
        let doc = Html::parse_fragment("<div href='/x'>x</div>");
        let selector = Selector::parse("div").unwrap();

        assert!(nav.anchor_url(&first(&doc, &selector)).is_err());
    }

    #[test]
    fn anchors_without_href_are_rejected() {
        let nav = navigator();
        let doc = Html::parse_fragment("<a name='top'>x</a>");
        let selector = Selector::parse("a").unwrap();

        assert!(nav.anchor_url(&first(&doc, &selector)).is_err());
    }
}
