use async_trait::async_trait;

use juriscrape_core::types::ExtractionMethod;
use juriscrape_core::CrawlError;

pub mod archive;
pub mod filter;
pub mod form;
pub mod pattern;
pub mod search;
pub mod sitemap;
pub mod taxonomy;

pub use archive::ArchiveProbeStrategy;
pub use filter::PatternFilter;
pub use form::FormDiscoveryStrategy;
pub use pattern::PatternGeneratorStrategy;
pub use search::SearchExplorerStrategy;
pub use sitemap::SitemapStrategy;
pub use taxonomy::TaxonomyStrategy;

/// Seed URLs produced by one strategy run.
#[derive(Debug, Default)]
pub struct StrategyResult {
    pub seed_urls: Vec<String>,
    pub metadata: serde_json::Value,
}

/// A pluggable seed producer. The orchestrator runs enabled strategies
/// sequentially; one strategy failing never stops the others.
#[async_trait]
pub trait SeedStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The extraction method stamped on seeds this strategy produces.
    fn method(&self) -> ExtractionMethod;

    /// Whether the strategy should run at all, given configuration and
    /// prerequisites (a browser, seed pages, ...).
    fn enabled(&self) -> bool;

    async fn initialize(&mut self) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn discover(&mut self) -> Result<StrategyResult, CrawlError>;

    async fn cleanup(&mut self) {}
}
