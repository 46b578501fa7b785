use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CrawlError;

/// Outcome of a navigation.
#[derive(Debug, Clone, Copy)]
pub struct PageResponse {
    pub status: u16,
}

/// A DOM element snapshot materialized out of the live page. Elements are
/// copied data, not handles: re-query after navigation.
#[derive(Debug, Clone, Default)]
pub struct DomElement {
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub visible: bool,
}

impl DomElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn text_content(&self) -> &str {
        &self.text
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// One open browser page. The crawler and the strategies only ever talk
/// to this trait; the concrete driver lives in its own crate.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<PageResponse, CrawlError>;

    async fn content(&self) -> Result<String, CrawlError>;

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<DomElement>, CrawlError>;

    async fn set_extra_http_headers(
        &self,
        headers: HashMap<String, String>,
    ) -> Result<(), CrawlError>;

    async fn title(&self) -> Result<String, CrawlError>;

    fn url(&self) -> String;

    async fn screenshot(&self, path: &Path) -> Result<(), CrawlError>;

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), CrawlError>;

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, CrawlError>;

    async fn close(self: Box<Self>) -> Result<(), CrawlError>;
}

/// Opens pages.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>, CrawlError>;
}
