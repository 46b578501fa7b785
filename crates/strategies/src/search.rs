use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use tracing::{debug, warn};
use url::Url;

use juriscrape_core::config::{SearchExplorerConfig, SiteConfig};
use juriscrape_core::types::ExtractionMethod;
use juriscrape_core::CrawlError;
use juriscrape_extract::html::find_pdf_urls_with_base;
use juriscrape_net::AdaptiveRateLimiter;

use crate::{PatternFilter, SeedStrategy, StrategyResult};

/// Quarterly date windows covering the last `years_back` years up to and
/// including the current year.
pub fn quarterly_ranges(years_back: i32, today: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut ranges = Vec::new();
    for year in (today.year() - years_back)..=today.year() {
        for month in [1u32, 4, 7, 10] {
            let Some(start) = NaiveDate::from_ymd_opt(year, month, 1) else {
                continue;
            };
            let end = start + ChronoDuration::days(89);
            ranges.push((start, end));
        }
    }
    ranges
}

/// Replays the portal's search API over quarterly windows per configured
/// jurisdiction and harvests PDF URLs from every response page.
pub struct SearchExplorerStrategy {
    config: SearchExplorerConfig,
    sites: Vec<SiteConfig>,
    filter: PatternFilter,
    rate_limiter: Arc<AdaptiveRateLimiter>,
    client: Option<reqwest::Client>,
}

impl SearchExplorerStrategy {
    pub fn new(
        config: SearchExplorerConfig,
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

    async fn explore_site(&self, site: &SiteConfig) -> Vec<String> {
        let Some(api) = &site.api else {
            return Vec::new();
        };
        if api.jurisdictions.is_empty() {
            return Vec::new();
        }
        let Ok(base) = Url::parse(&site.base_url) else {
            warn!(site = %site.name, "unparseable base_url, skipping search explorer");
            return Vec::new();
        };

        let mut seeds = Vec::new();
        let ranges = quarterly_ranges(self.config.years_back, Utc::now().date_naive());
        for jurisdiction in &api.jurisdictions {
            for (start, end) in &ranges {
                let params = [
                    (api.jurisdiction_field.as_str(), jurisdiction.clone()),
                    (api.start_field.as_str(), start.format("%d/%m/%Y").to_string()),
                    (api.end_field.as_str(), end.format("%d/%m/%Y").to_string()),
                    (api.max_field.as_str(), self.config.max_per_request.to_string()),
                    (api.page_field.as_str(), "1".to_string()),
                ];

                match self.post(&api.search_url, &params).await {
                    Ok(html) => {
                        let pdfs = find_pdf_urls_with_base(&html, &base);
                        debug!(
                            jurisdiction = %jurisdiction,
                            start = %start,
                            count = pdfs.len(),
                            "search window harvested"
                        );
                        seeds.extend(pdfs);
                    }
                    Err(e) => warn!(
                        jurisdiction = %jurisdiction,
                        start = %start,
                        end = %end,
                        "search request failed: {e}"
                    ),
                }

                if seeds.len() >= self.config.max_results {
                    return seeds;
                }
            }
        }
        seeds
    }

    async fn post(&self, url: &str, params: &[(&str, String)]) -> Result<String, CrawlError> {
        let Some(client) = &self.client else {
            return Err(CrawlError::Config("search client not initialized".into()));
        };
        self.rate_limiter.wait().await;
        let resp = client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        if resp.status().as_u16() == 429 {
            self.rate_limiter.on_429().await;
            return Err(CrawlError::Network("HTTP 429".into()));
        }
        if !resp.status().is_success() {
            return Err(CrawlError::Network(format!("HTTP {}", resp.status())));
        }
        self.rate_limiter.on_success().await;
        resp.text()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))
    }
}

#[async_trait]
impl SeedStrategy for SearchExplorerStrategy {
    fn name(&self) -> &'static str {
        "search_explorer"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::SearchApi
    }

    fn enabled(&self) -> bool {
        self.config.enabled
            && self
                .sites
                .iter()
                .any(|s| s.enabled && s.api.as_ref().is_some_and(|a| !a.jurisdictions.is_empty()))
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
        let mut seeds = Vec::new();
        for site in self.sites.clone() {
            if !site.enabled {
                continue;
            }
            seeds.extend(self.explore_site(&site).await);
            if seeds.len() >= self.config.max_results {
                break;
            }
        }

        let mut filtered = self.filter.apply(seeds);
        filtered.truncate(self.config.max_results);

        Ok(StrategyResult {
            metadata: serde_json::json!({
                "strategy": self.name(),
                "total_seeds": filtered.len(),
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
    fn twenty_years_of_quarters() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let ranges = quarterly_ranges(20, today);
        assert_eq!(ranges.len(), 21 * 4);
        assert_eq!(ranges[0].0, NaiveDate::from_ymd_opt(2006, 1, 1).unwrap());
        let (last_start, last_end) = ranges[ranges.len() - 1];
        assert_eq!(last_start, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(last_end - last_start, ChronoDuration::days(89));
    }

    #[test]
    fn every_window_spans_ninety_days_from_a_quarter_start() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        for (start, end) in quarterly_ranges(1, today) {
            assert_eq!(start.day(), 1);
            assert!([1, 4, 7, 10].contains(&start.month()));
            assert_eq!(end - start, ChronoDuration::days(89));
        }
    }
}
