use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrawlError;

/// How deep a discovery run goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Seed pages only, no link following.
    Shallow,
    /// BFS bounded by `max_depth`.
    Deep,
    /// BFS without a depth limit.
    #[default]
    Full,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryMode::Shallow => "shallow",
            DiscoveryMode::Deep => "deep",
            DiscoveryMode::Full => "full",
        };
        f.write_str(s)
    }
}

impl FromStr for DiscoveryMode {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shallow" => Ok(DiscoveryMode::Shallow),
            "deep" => Ok(DiscoveryMode::Deep),
            "full" => Ok(DiscoveryMode::Full),
            other => Err(CrawlError::Config(format!("unknown mode: {other}"))),
        }
    }
}

/// Lifecycle of a discovery session. Terminal states are set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Interrupted => "interrupted",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation state of a stored PDF link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Discovered,
    Validated,
    Accessible,
    Broken,
    Blocked,
    Downloaded,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Discovered => "discovered",
            LinkStatus::Validated => "validated",
            LinkStatus::Accessible => "accessible",
            LinkStatus::Broken => "broken",
            LinkStatus::Blocked => "blocked",
            LinkStatus::Downloaded => "downloaded",
        }
    }
}

impl FromStr for LinkStatus {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(LinkStatus::Discovered),
            "validated" => Ok(LinkStatus::Validated),
            "accessible" => Ok(LinkStatus::Accessible),
            "broken" => Ok(LinkStatus::Broken),
            "blocked" => Ok(LinkStatus::Blocked),
            "downloaded" => Ok(LinkStatus::Downloaded),
            other => Err(CrawlError::Storage(format!("unknown link status: {other}"))),
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a PDF URL (or seed) was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    CssPdfSelector,
    RegexFallback,
    ScriptScan,
    Sitemap,
    Pattern,
    SearchApi,
    ArchiveProbe,
    Taxonomy,
    FormSubmit,
    Seed,
    StructuredData,
    InternalLink,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::CssPdfSelector => "css_pdf_selector",
            ExtractionMethod::RegexFallback => "regex_fallback",
            ExtractionMethod::ScriptScan => "script_scan",
            ExtractionMethod::Sitemap => "sitemap",
            ExtractionMethod::Pattern => "pattern",
            ExtractionMethod::SearchApi => "search_api",
            ExtractionMethod::ArchiveProbe => "archive_probe",
            ExtractionMethod::Taxonomy => "taxonomy",
            ExtractionMethod::FormSubmit => "form_submit",
            ExtractionMethod::Seed => "seed",
            ExtractionMethod::StructuredData => "structured_data",
            ExtractionMethod::InternalLink => "internal_link",
        }
    }
}

impl FromStr for ExtractionMethod {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "css_pdf_selector" => Ok(ExtractionMethod::CssPdfSelector),
            "regex_fallback" => Ok(ExtractionMethod::RegexFallback),
            "script_scan" => Ok(ExtractionMethod::ScriptScan),
            "sitemap" => Ok(ExtractionMethod::Sitemap),
            "pattern" => Ok(ExtractionMethod::Pattern),
            "search_api" => Ok(ExtractionMethod::SearchApi),
            "archive_probe" => Ok(ExtractionMethod::ArchiveProbe),
            "taxonomy" => Ok(ExtractionMethod::Taxonomy),
            "form_submit" => Ok(ExtractionMethod::FormSubmit),
            "seed" => Ok(ExtractionMethod::Seed),
            "structured_data" => Ok(ExtractionMethod::StructuredData),
            "internal_link" => Ok(ExtractionMethod::InternalLink),
            other => Err(CrawlError::Parse(format!("unknown extraction method: {other}"))),
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending frontier item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlEntry {
    pub url: String,
    pub depth: u32,
    pub source_url: Option<String>,
    pub method: ExtractionMethod,
}

impl CrawlEntry {
    pub fn seed(url: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            source_url: None,
            method,
        }
    }
}

/// A PDF candidate pulled out of a single page.
#[derive(Debug, Clone)]
pub struct DiscoveredPdf {
    pub url: String,
    pub source_url: String,
    pub depth: u32,
    pub method: ExtractionMethod,
    pub confidence: f64,
}

/// Result of a HEAD probe against a PDF URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub accessible: bool,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub final_url: Option<String>,
    pub redirect_count: u32,
    pub error: Option<String>,
}

/// What the engine emits to its consumer for every discovered PDF.
#[derive(Debug, Clone, Serialize)]
pub struct PdfEvent {
    pub url: String,
    pub source_url: String,
    pub depth: u32,
    pub method: ExtractionMethod,
    pub validation: Option<ValidationOutcome>,
}

/// Counters carried by the crawl loop and serialized into checkpoints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_visited: u64,
    pub pdfs_found: u64,
    pub internal_links_found: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub captchas: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_method_round_trips_through_str() {
        for m in [
            ExtractionMethod::CssPdfSelector,
            ExtractionMethod::RegexFallback,
            ExtractionMethod::ScriptScan,
            ExtractionMethod::Sitemap,
            ExtractionMethod::Pattern,
            ExtractionMethod::SearchApi,
            ExtractionMethod::ArchiveProbe,
            ExtractionMethod::Taxonomy,
            ExtractionMethod::FormSubmit,
            ExtractionMethod::Seed,
            ExtractionMethod::StructuredData,
            ExtractionMethod::InternalLink,
        ] {
            assert_eq!(m.as_str().parse::<ExtractionMethod>().unwrap(), m);
        }
    }

    #[test]
    fn terminal_status_detection() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Interrupted.is_terminal());
    }
}
