use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;
use url::Url;

use juriscrape_core::config::PatternGeneratorConfig;
use juriscrape_core::types::ExtractionMethod;
use juriscrape_core::CrawlError;
use juriscrape_storage::Storage;

use crate::{PatternFilter, SeedStrategy, StrategyResult};

static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const SEQ_PLACEHOLDER: &str = "{SEQ}";

/// Group `.pdf` URLs by skeleton (the last numeric token of the filename
/// replaced by a placeholder) and interpolate every missing integer
/// between the observed minimum and maximum, preserving zero-padding.
pub fn fill_pattern_gaps(urls: &[String], max_urls: usize) -> Vec<String> {
    // (sequence values, padding width, skeleton) per group. BTreeMap keeps
    // output order deterministic across runs.
    let mut groups: BTreeMap<String, (BTreeSet<u64>, usize)> = BTreeMap::new();

    for raw in urls {
        let Ok(url) = Url::parse(raw) else {
            continue;
        };
        let path = url.path();
        if !path.to_ascii_lowercase().ends_with(".pdf") {
            continue;
        }
        let filename_start = match path.rfind('/') {
            Some(idx) => idx + 1,
            None => 0,
        };
        let filename = &path[filename_start..];
        let Some(last_run) = DIGIT_RUN_RE.find_iter(filename).last() else {
            continue;
        };
        let Ok(seq) = last_run.as_str().parse::<u64>() else {
            continue;
        };
        let width = last_run.len();

        // Skeleton over scheme + authority + path so hosts never collide.
        // Queries and fragments are dropped; generated PDFs use the
        // canonical path form.
        let Some(host) = url.host_str() else {
            continue;
        };
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let skeleton = format!(
            "{}://{}{}{}{}{}",
            url.scheme(),
            authority,
            &path[..filename_start],
            &filename[..last_run.start()],
            SEQ_PLACEHOLDER,
            &filename[last_run.end()..]
        );

        let entry = groups.entry(skeleton).or_insert_with(|| (BTreeSet::new(), width));
        entry.0.insert(seq);
    }

    let mut generated = Vec::new();
    'groups: for (skeleton, (seqs, width)) in &groups {
        if seqs.len() < 2 {
            continue;
        }
        let width = *width;
        let min = *seqs.iter().next().expect("non-empty");
        let max = *seqs.iter().next_back().expect("non-empty");
        for seq in min..=max {
            if seqs.contains(&seq) {
                continue;
            }
            generated.push(skeleton.replace(SEQ_PLACEHOLDER, &format!("{seq:0width$}")));
            if generated.len() >= max_urls {
                break 'groups;
            }
        }
    }
    generated
}

/// Reads the stored PDF corpus and proposes the sequence numbers it is
/// missing. Only worth running once enough samples exist.
pub struct PatternGeneratorStrategy {
    config: PatternGeneratorConfig,
    filter: PatternFilter,
    storage: Storage,
}

impl PatternGeneratorStrategy {
    pub fn new(config: PatternGeneratorConfig, storage: Storage) -> Result<Self, CrawlError> {
        let filter = PatternFilter::compile(&config.include_patterns, &config.exclude_patterns)?;
        Ok(Self {
            config,
            filter,
            storage,
        })
    }
}

#[async_trait]
impl SeedStrategy for PatternGeneratorStrategy {
    fn name(&self) -> &'static str {
        "pattern_generator"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Pattern
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn discover(&mut self) -> Result<StrategyResult, CrawlError> {
        let urls = self.storage.load_pdf_urls().await?;
        if urls.len() < self.config.min_samples {
            info!(
                found = urls.len(),
                required = self.config.min_samples,
                "not enough stored URLs for pattern generation"
            );
            return Ok(StrategyResult {
                metadata: serde_json::json!({
                    "strategy": self.name(),
                    "sample_count": urls.len(),
                    "generated_count": 0,
                }),
                seed_urls: Vec::new(),
            });
        }

        let samples = self.filter.apply(urls);
        let mut generated = fill_pattern_gaps(&samples, self.config.max_urls);
        generated.truncate(self.config.max_urls);
        info!(
            samples = samples.len(),
            generated = generated.len(),
            "pattern gaps interpolated"
        );

        Ok(StrategyResult {
            metadata: serde_json::json!({
                "strategy": self.name(),
                "sample_count": samples.len(),
                "generated_count": generated.len(),
            }),
            seed_urls: generated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_gaps_with_zero_padding_preserved() {
        let mut urls: Vec<String> = (1..=100)
            .filter(|n| *n != 42 && *n != 73)
            .map(|n| format!("https://site/docs/doc_{n:04}.pdf"))
            .collect();
        urls.sort();

        let generated = fill_pattern_gaps(&urls, 10_000);
        assert_eq!(
            generated,
            vec![
                "https://site/docs/doc_0042.pdf".to_string(),
                "https://site/docs/doc_0073.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn nothing_generated_outside_observed_range() {
        let urls = vec![
            "https://site/docs/doc_0005.pdf".to_string(),
            "https://site/docs/doc_0008.pdf".to_string(),
        ];
        let generated = fill_pattern_gaps(&urls, 10_000);
        assert_eq!(
            generated,
            vec![
                "https://site/docs/doc_0006.pdf".to_string(),
                "https://site/docs/doc_0007.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn single_sample_groups_are_ignored() {
        let urls = vec!["https://site/docs/doc_0001.pdf".to_string()];
        assert!(fill_pattern_gaps(&urls, 100).is_empty());
    }

    #[test]
    fn last_numeric_token_is_the_sequence() {
        let urls = vec![
            "https://site/2023/sentencia_2023_001.pdf".to_string(),
            "https://site/2023/sentencia_2023_004.pdf".to_string(),
        ];
        let generated = fill_pattern_gaps(&urls, 100);
        assert_eq!(
            generated,
            vec![
                "https://site/2023/sentencia_2023_002.pdf".to_string(),
                "https://site/2023/sentencia_2023_003.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn different_hosts_never_mix() {
        let urls = vec![
            "https://a.example/doc_01.pdf".to_string(),
            "https://b.example/doc_05.pdf".to_string(),
        ];
        assert!(fill_pattern_gaps(&urls, 100).is_empty());
    }

    #[test]
    fn cap_bounds_the_generated_set() {
        let urls = vec![
            "https://site/doc_0001.pdf".to_string(),
            "https://site/doc_1000.pdf".to_string(),
        ];
        let generated = fill_pattern_gaps(&urls, 5);
        assert_eq!(generated.len(), 5);
        assert_eq!(generated[0], "https://site/doc_0002.pdf");
    }

    #[test]
    fn non_pdf_urls_are_skipped() {
        let urls = vec![
            "https://site/page_01.html".to_string(),
            "https://site/page_03.html".to_string(),
        ];
        assert!(fill_pattern_gaps(&urls, 100).is_empty());
    }
}
