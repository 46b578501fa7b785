//! Static in-memory Page used by extractor and CAPTCHA tests.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use juriscrape_core::page::{DomElement, Page, PageResponse};
use juriscrape_core::CrawlError;

pub struct MockPage {
    url: String,
    html: String,
    status: u16,
}

impl MockPage {
    pub fn new(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            html: html.to_string(),
            status: 200,
        }
    }
}

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, _url: &str, _timeout: Duration) -> Result<PageResponse, CrawlError> {
        Ok(PageResponse {
            status: self.status,
        })
    }

    async fn content(&self) -> Result<String, CrawlError> {
        Ok(self.html.clone())
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<DomElement>, CrawlError> {
        let parsed =
            Selector::parse(selector).map_err(|e| CrawlError::Parse(format!("{selector}: {e}")))?;
        let document = Html::parse_document(&self.html);
        let elements = document
            .select(&parsed)
            .map(|el| DomElement {
                attributes: el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                text: el.text().collect::<String>(),
                visible: true,
            })
            .collect();
        Ok(elements)
    }

    async fn set_extra_http_headers(
        &self,
        _headers: HashMap<String, String>,
    ) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn title(&self) -> Result<String, CrawlError> {
        let selector = Selector::parse("title").expect("static selector");
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default())
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    async fn screenshot(&self, _path: &Path) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value, CrawlError> {
        Ok(serde_json::Value::Null)
    }

    async fn close(self: Box<Self>) -> Result<(), CrawlError> {
        Ok(())
    }
}
