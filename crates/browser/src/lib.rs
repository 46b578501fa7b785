use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser as Chrome, LaunchOptionsBuilder, Tab};
use serde::Deserialize;
use tracing::{debug, info};

use juriscrape_core::config::BrowserConfig;
use juriscrape_core::page::{Browser, DomElement, Page, PageResponse};
use juriscrape_core::CrawlError;

pub mod behavior;

pub use behavior::BehaviorSimulator;

/// Chromium-backed implementation of the `Browser` capability.
pub struct ChromeBrowser {
    chrome: Chrome,
}

impl ChromeBrowser {
    /// Launch a headless Chromium. `proxy_url`, when given, routes every
    /// page through that proxy for the browser's lifetime.
    pub fn launch(config: &BrowserConfig, proxy_url: Option<&str>) -> Result<Self, CrawlError> {
        let mut extra_args: Vec<OsString> = vec![
            OsString::from("--no-sandbox"),
            OsString::from("--disable-dev-shm-usage"),
            OsString::from("--disable-gpu"),
        ];
        if let Some(proxy) = proxy_url {
            extra_args.push(OsString::from(format!("--proxy-server={proxy}")));
        }

        let mut builder = LaunchOptionsBuilder::default();
        builder
            .headless(config.headless)
            .window_size(Some((1920, 1080)))
            .args(extra_args.iter().map(|a| a.as_ref()).collect());

        let chrome_path = config
            .chrome_path
            .clone()
            .or_else(|| std::env::var("CHROME_PATH").ok());
        if let Some(path) = chrome_path {
            builder.path(Some(std::path::PathBuf::from(path)));
        }

        let options = builder
            .build()
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        let chrome = Chrome::new(options).map_err(|e| CrawlError::Browser(e.to_string()))?;
        info!(headless = config.headless, "browser launched");
        Ok(Self { chrome })
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, CrawlError> {
        let tab = self
            .chrome
            .new_tab()
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        Ok(Box::new(ChromePage { tab }))
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

#[derive(Deserialize)]
struct JsElement {
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    visible: bool,
}

impl ChromePage {
    fn eval(&self, expression: &str) -> Result<serde_json::Value, CrawlError> {
        let object = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        Ok(object.value.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<PageResponse, CrawlError> {
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| CrawlError::Browser(e.to_string()))?;

        // Chromium exposes the navigation's HTTP status through the
        // performance timeline; absent that, assume the load was clean.
        let status = self
            .eval("performance.getEntriesByType('navigation')[0]?.responseStatus ?? 200")
            .ok()
            .and_then(|v| v.as_u64())
            .map(|s| s as u16)
            .filter(|&s| s > 0)
            .unwrap_or(200);

        debug!(url, status, "navigated");
        Ok(PageResponse { status })
    }

    async fn content(&self) -> Result<String, CrawlError> {
        self.tab
            .get_content()
            .map_err(|e| CrawlError::Browser(e.to_string()))
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<DomElement>, CrawlError> {
        let selector_js = serde_json::to_string(selector)
            .map_err(|e| CrawlError::Parse(e.to_string()))?;
        let expression = format!(
            r#"JSON.stringify(Array.from(document.querySelectorAll({selector_js})).map(el => ({{
                attributes: Object.fromEntries(Array.from(el.attributes).map(a => [a.name, a.value])),
                text: el.textContent || "",
                visible: !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length)
            }})))"#
        );
        let value = self.eval(&expression)?;
        let Some(json) = value.as_str() else {
            return Ok(Vec::new());
        };
        let elements: Vec<JsElement> = serde_json::from_str(json)
            .map_err(|e| CrawlError::Parse(format!("selector result: {e}")))?;
        Ok(elements
            .into_iter()
            .map(|el| DomElement {
                attributes: el.attributes,
                text: el.text,
                visible: el.visible,
            })
            .collect())
    }

    async fn set_extra_http_headers(
        &self,
        headers: HashMap<String, String>,
    ) -> Result<(), CrawlError> {
        let borrowed: HashMap<&str, &str> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.tab
            .set_extra_http_headers(borrowed)
            .map_err(|e| CrawlError::Browser(e.to_string()))
    }

    async fn title(&self) -> Result<String, CrawlError> {
        self.tab
            .get_title()
            .map_err(|e| CrawlError::Browser(e.to_string()))
    }

    fn url(&self) -> String {
        self.tab.get_url()
    }

    async fn screenshot(&self, path: &Path) -> Result<(), CrawlError> {
        let data = self
            .tab
            .capture_screenshot(
                headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, data).map_err(|e| CrawlError::Browser(e.to_string()))
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), CrawlError> {
        self.eval(&format!(
            "window.dispatchEvent(new MouseEvent('mousemove', {{clientX: {x}, clientY: {y}}})); null"
        ))
        .map(|_| ())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, CrawlError> {
        self.eval(expression)
    }

    async fn close(self: Box<Self>) -> Result<(), CrawlError> {
        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|e| CrawlError::Browser(e.to_string()))
    }
}
