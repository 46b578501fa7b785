use serde::{Deserialize, Serialize};

use crate::types::DiscoveryMode;

/// Workspace-wide configuration, deserialized from TOML. Every section
/// has complete defaults so a missing file still yields a runnable
/// (if empty-seeded) configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub rate_limiting: RateLimitingConfig,
    pub proxy: ProxyConfig,
    pub user_agent: UserAgentConfig,
    pub captcha: CaptchaConfig,
    pub behavior: BehaviorConfig,
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
    pub sitemap: SitemapConfig,
    pub pattern_generator: PatternGeneratorConfig,
    pub search_explorer: SearchExplorerConfig,
    pub taxonomy: TaxonomyConfig,
    pub form_discovery: FormDiscoveryConfig,
    pub archive_probe: ArchiveProbeConfig,
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    /// 0 means unlimited.
    pub max_depth: u32,
    pub follow_internal_links: bool,
    pub validate_on_discovery: bool,
    pub deduplicate: bool,
    /// Query keys that keep their value when normalizing a .pdf URL.
    pub pdf_identity_params: Vec<String>,
    /// Pages between checkpoint writes.
    pub save_interval: u64,
    pub session_dir: String,
    pub validate_timeout_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Full,
            max_depth: 0,
            follow_internal_links: true,
            validate_on_discovery: true,
            deduplicate: true,
            pdf_identity_params: Vec::new(),
            save_interval: 100,
            session_dir: "data/sessions".to_string(),
            validate_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub requests_per_minute: u32,
    pub burst_size: u32,
    pub backoff_on_429: bool,
    pub max_backoff_seconds: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 20,
            burst_size: 5,
            backoff_on_429: true,
            max_backoff_seconds: 300,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    /// Plain-text list endpoints, one `host:port` or `scheme://host:port`
    /// per line, `#` comments ignored.
    pub sources: Vec<String>,
    pub cache_file: String,
    /// Cache is adopted on startup only when it yields at least this many records.
    pub min_required: usize,
    pub refresh_hours: u64,
    pub min_anonymity: Option<String>,
    pub require_https: bool,
    pub rotate_per_request: bool,
    pub rotate_on_error: bool,
    pub test_url: String,
    pub test_timeout_seconds: u64,
    pub max_test_concurrency: usize,
    pub selection: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: vec![
                "https://cdn.jsdelivr.net/gh/proxifly/free-proxy-list@main/proxies/all/data.txt"
                    .to_string(),
                "https://raw.githubusercontent.com/ProxyScraper/ProxyScraper/main/http.txt"
                    .to_string(),
            ],
            cache_file: "data/proxies_cache.json".to_string(),
            min_required: 100,
            refresh_hours: 6,
            min_anonymity: None,
            require_https: false,
            rotate_per_request: true,
            rotate_on_error: true,
            test_url: "http://httpbin.org/ip".to_string(),
            test_timeout_seconds: 10,
            max_test_concurrency: 100,
            selection: "weighted".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UserAgentConfig {
    pub pool_file: String,
    pub rotate_per_session: bool,
    pub rotate_per_request: bool,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            pool_file: "config/user_agents.txt".to_string(),
            rotate_per_session: true,
            rotate_per_request: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CaptchaConfig {
    pub auto_detect: bool,
    pub pause_on_captcha: bool,
    /// 0 means block on manual input when pausing is enabled.
    pub pause_seconds: u64,
    pub screenshot_on_captcha: bool,
    pub manual_solve_timeout: u64,
    pub alerts_dir: String,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            pause_on_captcha: true,
            pause_seconds: 0,
            screenshot_on_captcha: true,
            manual_solve_timeout: 300,
            alerts_dir: "data/sessions/captchas".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BehaviorConfig {
    pub simulate_human: bool,
    pub min_delay: f64,
    pub max_delay: f64,
    /// uniform | normal | exponential
    pub distribution: String,
    pub mouse_movements: bool,
    pub scrolling: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            simulate_human: true,
            min_delay: 1.0,
            max_delay: 5.0,
            distribution: "normal".to_string(),
            mouse_movements: true,
            scrolling: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub navigation_timeout_seconds: u64,
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_seconds: 60,
            chrome_path: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "data/juriscrape.db".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SitemapConfig {
    pub enabled: bool,
    pub urls: Vec<String>,
    pub max_depth: u32,
    pub max_urls: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            urls: Vec::new(),
            max_depth: 3,
            max_urls: 5000,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PatternGeneratorConfig {
    pub enabled: bool,
    pub min_samples: usize,
    pub max_urls: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for PatternGeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_samples: 100,
            max_urls: 10_000,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SearchExplorerConfig {
    pub enabled: bool,
    pub max_results: usize,
    pub max_per_request: usize,
    pub years_back: i32,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for SearchExplorerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_results: 50_000,
            max_per_request: 1000,
            years_back: 20,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub enabled: bool,
    pub selectors: Vec<String>,
    pub max_pages_per_site: usize,
    /// Navigation links visited in the depth-1 pass.
    pub follow_limit: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            selectors: vec![
                "nav a".to_string(),
                ".menu a".to_string(),
                ".sidebar a".to_string(),
                ".navigation a".to_string(),
                ".nav-menu a".to_string(),
                "[role=\"navigation\"] a".to_string(),
                ".breadcrumb a".to_string(),
            ],
            max_pages_per_site: 100,
            follow_limit: 20,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FormDiscoveryConfig {
    pub enabled: bool,
    pub seed_pages: Vec<String>,
    pub max_combinations: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for FormDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seed_pages: Vec::new(),
            max_combinations: 1000,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ArchiveProbeConfig {
    pub enabled: bool,
    /// Each template must contain `{year}`.
    pub path_templates: Vec<String>,
    pub start_year: i32,
    pub max_probes: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for ArchiveProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path_templates: vec![
                "/archivos/{year}".to_string(),
                "/historico/{year}".to_string(),
                "/legacy/{year}".to_string(),
                "/old/{year}".to_string(),
                "/archive/{year}".to_string(),
            ],
            start_year: 2000,
            max_probes: 500,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            timeout_seconds: 30,
        }
    }
}

/// One target site: where crawling starts and, optionally, how its search
/// API is shaped.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteConfig {
    pub name: String,
    #[serde(default = "default_site_enabled")]
    pub enabled: bool,
    pub base_url: String,
    #[serde(default)]
    pub paths: Vec<String>,
    pub api: Option<SiteApiConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteApiConfig {
    pub search_url: String,
    #[serde(default)]
    pub jurisdictions: Vec<String>,
    #[serde(default = "default_jurisdiction_field")]
    pub jurisdiction_field: String,
    #[serde(default = "default_start_field")]
    pub start_field: String,
    #[serde(default = "default_end_field")]
    pub end_field: String,
    #[serde(default = "default_max_field")]
    pub max_field: String,
    #[serde(default = "default_page_field")]
    pub page_field: String,
}

fn default_site_enabled() -> bool {
    true
}
fn default_jurisdiction_field() -> String {
    "jurisdiction".to_string()
}
fn default_start_field() -> String {
    "startDate".to_string()
}
fn default_end_field() -> String {
    "endDate".to_string()
}
fn default_max_field() -> String {
    "max".to_string()
}
fn default_page_field() -> String {
    "page".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_full_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.discovery.max_depth, 0);
        assert_eq!(config.discovery.save_interval, 100);
        assert_eq!(config.rate_limiting.requests_per_minute, 20);
        assert_eq!(config.rate_limiting.burst_size, 5);
        assert!(config.proxy.enabled);
        assert_eq!(config.proxy.max_test_concurrency, 100);
        assert_eq!(config.sitemap.max_depth, 3);
        assert_eq!(config.pattern_generator.min_samples, 100);
        assert!(config.sites.is_empty());
    }

    #[test]
    fn site_section_parses_with_api_defaults() {
        let toml = r#"
            [[sites]]
            name = "cendoj"
            base_url = "https://www.poderjudicial.es"
            paths = ["/search/indexAN.jsp"]

            [sites.api]
            search_url = "https://www.poderjudicial.es/search/search.action"
            jurisdictions = ["CIVIL", "PENAL"]
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sites.len(), 1);
        let api = config.sites[0].api.as_ref().unwrap();
        assert_eq!(api.jurisdiction_field, "jurisdiction");
        assert_eq!(api.start_field, "startDate");
    }
}
