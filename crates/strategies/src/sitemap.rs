use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use juriscrape_core::config::SitemapConfig;
use juriscrape_core::types::ExtractionMethod;
use juriscrape_core::CrawlError;
use juriscrape_net::AdaptiveRateLimiter;

use crate::{PatternFilter, SeedStrategy, StrategyResult};

static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").unwrap());

/// What one sitemap document contains: nested sitemaps or page URLs.
#[derive(Debug, PartialEq)]
pub enum SitemapDoc {
    Index(Vec<String>),
    UrlSet(Vec<String>),
}

/// Pull `<loc>` entries out of sitemap XML. Namespaced documents are
/// handled by string-level extraction, which also shrugs off the mildly
/// malformed XML some portals serve.
pub fn parse_sitemap_document(xml: &str) -> SitemapDoc {
    let locs: Vec<String> = LOC_RE
        .captures_iter(xml)
        .map(|cap| unescape_xml(cap[1].trim()))
        .collect();
    if xml.contains("<sitemapindex") {
        SitemapDoc::Index(locs)
    } else {
        SitemapDoc::UrlSet(locs)
    }
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Recursive sitemap walker: configured sitemap URLs are fetched, index
/// files are followed into nested sitemaps up to `max_depth`, and the
/// union of page URLs becomes the seed set.
pub struct SitemapStrategy {
    config: SitemapConfig,
    filter: PatternFilter,
    rate_limiter: Arc<AdaptiveRateLimiter>,
    client: Option<reqwest::Client>,
}

impl SitemapStrategy {
    pub fn new(
        config: SitemapConfig,
        rate_limiter: Arc<AdaptiveRateLimiter>,
    ) -> Result<Self, CrawlError> {
        let filter = PatternFilter::compile(&config.include_patterns, &config.exclude_patterns)?;
        Ok(Self {
            config,
            filter,
            rate_limiter,
            client: None,
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String, CrawlError> {
        let Some(client) = &self.client else {
            return Err(CrawlError::Config("sitemap client not initialized".into()));
        };
        self.rate_limiter.wait().await;
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CrawlError::Network(format!(
                "HTTP {} fetching sitemap {url}",
                resp.status()
            )));
        }
        resp.text()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))
    }

    /// Iterative walk with a pending stack; `max_depth` bounds index
    /// nesting and a processed set breaks cycles.
    async fn walk(&self, root: &str) -> Vec<String> {
        let mut urls = Vec::new();
        let mut pending: Vec<(String, u32)> = vec![(root.to_string(), 0)];
        let mut processed: HashSet<String> = HashSet::new();

        while let Some((sitemap_url, depth)) = pending.pop() {
            if depth > self.config.max_depth || !processed.insert(sitemap_url.clone()) {
                continue;
            }
            if urls.len() >= self.config.max_urls {
                break;
            }

            let body = match self.fetch_text(&sitemap_url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %sitemap_url, "sitemap fetch failed: {e}");
                    continue;
                }
            };

            match parse_sitemap_document(&body) {
                SitemapDoc::Index(nested) => {
                    debug!(url = %sitemap_url, count = nested.len(), "sitemap index");
                    for nested_url in nested {
                        pending.push((nested_url, depth + 1));
                    }
                }
                SitemapDoc::UrlSet(entries) => {
                    debug!(url = %sitemap_url, count = entries.len(), "sitemap urlset");
                    urls.extend(entries);
                }
            }
        }

        urls
    }
}

#[async_trait]
impl SeedStrategy for SitemapStrategy {
    fn name(&self) -> &'static str {
        "sitemap"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Sitemap
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.urls.is_empty()
    }

    async fn initialize(&mut self) -> Result<(), CrawlError> {
        if self.client.is_none() {
            self.client = Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(self.config.timeout_seconds))
                    .build()
                    .map_err(|e| CrawlError::Network(e.to_string()))?,
            );
        }
        Ok(())
    }

    async fn discover(&mut self) -> Result<StrategyResult, CrawlError> {
        let mut discovered: Vec<String> = Vec::new();
        for sitemap_url in self.config.urls.clone() {
            discovered.extend(self.walk(&sitemap_url).await);
            if discovered.len() >= self.config.max_urls {
                break;
            }
        }

        let total = discovered.len();
        let mut filtered = self.filter.apply(discovered);
        filtered.truncate(self.config.max_urls);

        Ok(StrategyResult {
            metadata: serde_json::json!({
                "strategy": self.name(),
                "total_urls": total,
                "filtered_urls": filtered.len(),
            }),
            seed_urls: filtered,
        })
    }

    async fn cleanup(&mut self) {
        self.client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlset_entries_are_extracted() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://site/docs/a.pdf</loc></url>
  <url><loc> https://site/docs/b.pdf </loc></url>
</urlset>"#;
        assert_eq!(
            parse_sitemap_document(xml),
            SitemapDoc::UrlSet(vec![
                "https://site/docs/a.pdf".to_string(),
                "https://site/docs/b.pdf".to_string(),
            ])
        );
    }

    #[test]
    fn index_documents_are_distinguished() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://site/sitemap-2023.xml</loc></sitemap>
  <sitemap><loc>https://site/sitemap-2024.xml</loc></sitemap>
</sitemapindex>"#;
        match parse_sitemap_document(xml) {
            SitemapDoc::Index(urls) => assert_eq!(urls.len(), 2),
            other => panic!("expected index, got {other:?}"),
        }
    }

    #[test]
    fn entities_are_unescaped() {
        let xml = "<urlset><url><loc>https://site/search?q=a&amp;page=1</loc></url></urlset>";
        assert_eq!(
            parse_sitemap_document(xml),
            SitemapDoc::UrlSet(vec!["https://site/search?q=a&page=1".to_string()])
        );
    }

    #[test]
    fn malformed_xml_yields_partial_results() {
        let xml = "<urlset><url><loc>https://site/a.pdf</loc></url><url><loc>https://site/b";
        assert_eq!(
            parse_sitemap_document(xml),
            SitemapDoc::UrlSet(vec!["https://site/a.pdf".to_string()])
        );
    }
}
