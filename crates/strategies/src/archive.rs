use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::{debug, warn};
use url::Url;

use juriscrape_core::config::{ArchiveProbeConfig, SiteConfig};
use juriscrape_core::types::ExtractionMethod;
use juriscrape_core::CrawlError;
use juriscrape_net::AdaptiveRateLimiter;

use crate::{PatternFilter, SeedStrategy, StrategyResult};

/// Expand `{year}` path templates over `[start_year, current_year]`,
/// bounded by `max_probes`.
pub fn build_probe_urls(
    base_url: &str,
    templates: &[String],
    start_year: i32,
    current_year: i32,
    max_probes: usize,
) -> Vec<String> {
    let Ok(base) = Url::parse(&format!("{}/", base_url.trim_end_matches('/'))) else {
        return Vec::new();
    };
    let mut urls = Vec::new();
    for template in templates {
        for year in start_year..=current_year {
            let path = template.replace("{year}", &year.to_string());
            if let Ok(url) = base.join(path.trim_start_matches('/')) {
                urls.push(url.to_string());
            }
            if urls.len() >= max_probes {
                return urls;
            }
        }
    }
    urls
}

/// Probes archive/legacy sections with HEAD requests: a 2xx or 3xx
/// answer promotes the URL to a seed.
pub struct ArchiveProbeStrategy {
    config: ArchiveProbeConfig,
    sites: Vec<SiteConfig>,
    filter: PatternFilter,
    rate_limiter: Arc<AdaptiveRateLimiter>,
    client: Option<reqwest::Client>,
}

impl ArchiveProbeStrategy {
    pub fn new(
        config: ArchiveProbeConfig,
        sites: Vec<SiteConfig>,
        rate_limiter: Arc<AdaptiveRateLimiter>,
    ) -> Result<Self, CrawlError> {
        let filter = PatternFilter::compile(&config.include_patterns, &config.exclude_patterns)?;
        Ok(Self {
            config,
            sites,
            filter,
            rate_limiter,
            client: None,
        })
    }
}

#[async_trait]
impl SeedStrategy for ArchiveProbeStrategy {
    fn name(&self) -> &'static str {
        "archive_probe"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::ArchiveProbe
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn initialize(&mut self) -> Result<(), CrawlError> {
        if self.client.is_none() {
            self.client = Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(self.config.timeout_seconds))
                    // Redirects stay visible: a 301 into the archive is a hit.
                    .redirect(reqwest::redirect::Policy::none())
                    .build()
                    .map_err(|e| CrawlError::Network(e.to_string()))?,
            );
        }
        Ok(())
    }

    async fn discover(&mut self) -> Result<StrategyResult, CrawlError> {
        let Some(client) = self.client.clone() else {
            return Err(CrawlError::Config("archive client not initialized".into()));
        };

        let current_year = Utc::now().year();
        let mut hits = Vec::new();
        let mut probed = 0usize;

        for site in &self.sites {
            if !site.enabled || site.base_url.is_empty() {
                continue;
            }
            let probe_urls = build_probe_urls(
                &site.base_url,
                &self.config.path_templates,
                self.config.start_year,
                current_year,
                self.config.max_probes.saturating_sub(probed),
            );

            for url in probe_urls {
                probed += 1;
                self.rate_limiter.wait().await;
                match client.head(&url).send().await {
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        if (200..400).contains(&status) {
                            debug!(url = %url, status, "archive probe hit");
                            hits.push(url);
                        }
                    }
                    Err(e) => debug!(url = %url, "archive probe failed: {e}"),
                }
            }
            if probed >= self.config.max_probes {
                warn!(max_probes = self.config.max_probes, "archive probe budget exhausted");
                break;
            }
        }

        let seed_urls = self.filter.apply(hits);
        Ok(StrategyResult {
            metadata: serde_json::json!({
                "strategy": self.name(),
                "probes_sent": probed,
                "hits": seed_urls.len(),
            }),
            seed_urls,
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
    fn expands_year_templates_within_range() {
        let urls = build_probe_urls(
            "https://site.example",
            &["/archivos/{year}".to_string()],
            2023,
            2025,
            100,
        );
        assert_eq!(
            urls,
            vec![
                "https://site.example/archivos/2023",
                "https://site.example/archivos/2024",
                "https://site.example/archivos/2025",
            ]
        );
    }

    #[test]
    fn probe_budget_is_respected() {
        let urls = build_probe_urls(
            "https://site.example",
            &["/a/{year}".to_string(), "/b/{year}".to_string()],
            2000,
            2025,
            10,
        );
        assert_eq!(urls.len(), 10);
    }

    #[test]
    fn bad_base_url_probes_nothing() {
        assert!(build_probe_urls("not a url", &["/a/{year}".to_string()], 2020, 2021, 10).is_empty());
    }
}
