use regex::Regex;

use juriscrape_core::CrawlError;

/// Include/exclude regex filtering shared by every strategy.
#[derive(Debug, Default)]
pub struct PatternFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PatternFilter {
    pub fn compile(include: &[String], exclude: &[String]) -> Result<Self, CrawlError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, CrawlError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| CrawlError::Config(format!("bad pattern {p}: {e}")))
                })
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn passes(&self, url: &str) -> bool {
        if self.exclude.iter().any(|p| p.is_match(url)) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| p.is_match(url)) {
            return false;
        }
        true
    }

    /// Sort, dedup and filter a URL list.
    pub fn apply(&self, urls: Vec<String>) -> Vec<String> {
        let mut urls: Vec<String> = urls.into_iter().filter(|u| self.passes(u)).collect();
        urls.sort();
        urls.dedup();
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_wins_over_include() {
        let filter = PatternFilter::compile(
            &[r"\.pdf$".to_string()],
            &["draft".to_string()],
        )
        .unwrap();
        assert!(filter.passes("https://site/final.pdf"));
        assert!(!filter.passes("https://site/draft.pdf"));
        assert!(!filter.passes("https://site/page.html"));
    }

    #[test]
    fn empty_include_passes_everything_not_excluded() {
        let filter = PatternFilter::compile(&[], &["private".to_string()]).unwrap();
        assert!(filter.passes("https://site/a"));
        assert!(!filter.passes("https://site/private/a"));
    }

    #[test]
    fn apply_sorts_and_dedups() {
        let filter = PatternFilter::default();
        let out = filter.apply(vec![
            "https://site/b".to_string(),
            "https://site/a".to_string(),
            "https://site/b".to_string(),
        ]);
        assert_eq!(out, vec!["https://site/a", "https://site/b"]);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        assert!(PatternFilter::compile(&["[".to_string()], &[]).is_err());
    }
}
