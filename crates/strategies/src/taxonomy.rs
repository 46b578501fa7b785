use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use juriscrape_core::config::{SiteConfig, TaxonomyConfig};
use juriscrape_core::page::{Browser, Page};
use juriscrape_core::types::ExtractionMethod;
use juriscrape_core::CrawlError;

use crate::{PatternFilter, SeedStrategy, StrategyResult};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Walks each site's navigation structure in the browser: harvest links
/// matching the navigation selectors on the base page, then visit a
/// bounded number of those and harvest again (BFS depth 1).
pub struct TaxonomyStrategy {
    config: TaxonomyConfig,
    sites: Vec<SiteConfig>,
    browser: Option<Arc<dyn Browser>>,
    filter: PatternFilter,
}

impl TaxonomyStrategy {
    pub fn new(
        config: TaxonomyConfig,
        sites: Vec<SiteConfig>,
        browser: Option<Arc<dyn Browser>>,
    ) -> Result<Self, CrawlError> {
        let filter = PatternFilter::compile(&config.include_patterns, &config.exclude_patterns)?;
        Ok(Self {
            config,
            sites,
            browser,
            filter,
        })
    }

    async fn harvest_links(&self, page: &dyn Page, base: &Url) -> BTreeSet<String> {
        let mut links = BTreeSet::new();
        for selector in &self.config.selectors {
            let elements = match page.query_selector_all(selector).await {
                Ok(elements) => elements,
                Err(e) => {
                    debug!(selector = %selector, "navigation selector failed: {e}");
                    continue;
                }
            };
            for el in elements {
                let Some(href) = el.attribute("href") else {
                    continue;
                };
                let Ok(resolved) = base.join(href.trim()) else {
                    continue;
                };
                let resolved = resolved.to_string();
                if self.filter.passes(&resolved) {
                    links.insert(resolved);
                }
            }
        }
        links
    }

    async fn crawl_site_navigation(&self, browser: &dyn Browser, base_url: &str) -> BTreeSet<String> {
        let mut seeds = BTreeSet::new();
        let Ok(base) = Url::parse(base_url) else {
            return seeds;
        };

        let page = match browser.new_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!(site = %base_url, "could not open page: {e}");
                return seeds;
            }
        };

        if let Err(e) = page.goto(base_url, NAVIGATION_TIMEOUT).await {
            warn!(site = %base_url, "navigation failed: {e}");
            let _ = page.close().await;
            return seeds;
        }
        let nav_links = self.harvest_links(page.as_ref(), &base).await;
        seeds.extend(nav_links.iter().cloned());

        for nav_url in nav_links.iter().take(self.config.follow_limit) {
            if seeds.len() >= self.config.max_pages_per_site {
                break;
            }
            match page.goto(nav_url, NAVIGATION_TIMEOUT).await {
                Ok(_) => {
                    let nested = self.harvest_links(page.as_ref(), &base).await;
                    seeds.extend(nested);
                }
                Err(e) => debug!(url = %nav_url, "nested navigation failed: {e}"),
            }
        }

        let _ = page.close().await;
        seeds
    }
}

#[async_trait]
impl SeedStrategy for TaxonomyStrategy {
    fn name(&self) -> &'static str {
        "taxonomy"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Taxonomy
    }

    fn enabled(&self) -> bool {
        self.config.enabled && self.browser.is_some()
    }

    async fn discover(&mut self) -> Result<StrategyResult, CrawlError> {
        let Some(browser) = self.browser.clone() else {
            return Ok(StrategyResult::default());
        };

        let mut all: BTreeSet<String> = BTreeSet::new();
        for site in &self.sites {
            if !site.enabled || site.base_url.is_empty() {
                continue;
            }
            let site_seeds = self
                .crawl_site_navigation(browser.as_ref(), site.base_url.trim_end_matches('/'))
                .await;
            debug!(site = %site.name, count = site_seeds.len(), "taxonomy links");
            all.extend(site_seeds);
        }

        let seed_urls: Vec<String> = all.into_iter().collect();
        Ok(StrategyResult {
            metadata: serde_json::json!({
                "strategy": self.name(),
                "total_seeds": seed_urls.len(),
            }),
            seed_urls,
        })
    }
}
