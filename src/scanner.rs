use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use juriscrape_browser::{BehaviorSimulator, ChromeBrowser};
use juriscrape_core::page::Browser;
use juriscrape_core::types::{CrawlEntry, DiscoveryMode, ExtractionMethod, PdfEvent, SessionStatus};
use juriscrape_core::{AppConfig, CancelFlag, CrawlError, UrlNormalizer};
use juriscrape_extract::CaptchaDetector;
use juriscrape_frontier::Checkpoint;
use juriscrape_net::proxy::{ProxyPool, ProxyRecord, SelectionStrategy};
use juriscrape_net::{AdaptiveRateLimiter, UrlValidator, UserAgentPool};
use juriscrape_storage::{ProxyHealthRow, SessionCounters, Storage};
use juriscrape_strategies::{
    ArchiveProbeStrategy, FormDiscoveryStrategy, PatternGeneratorStrategy, SearchExplorerStrategy,
    SeedStrategy, SitemapStrategy, TaxonomyStrategy,
};

use crate::crawl::DeepCrawler;

#[derive(Debug)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub counters: SessionCounters,
}

/// Wires the engine together for one discovery session: proxy and UA
/// pools, rate limiter, CAPTCHA policy, strategies and the crawler,
/// then drives the whole lifecycle and streams emitted PDFs on `tx`.
pub struct DiscoveryScanner {
    config: AppConfig,
    session_id: String,
    cancel: CancelFlag,
}

impl DiscoveryScanner {
    pub fn new(config: AppConfig, cancel: CancelFlag) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
            cancel,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn run(
        self,
        resume: Option<String>,
        depth_override: Option<u32>,
        mode_override: Option<DiscoveryMode>,
        tx: mpsc::Sender<PdfEvent>,
    ) -> Result<SessionSummary, CrawlError> {
        let config = &self.config;
        let mode = mode_override.unwrap_or(config.discovery.mode);
        let mut max_depth = depth_override.unwrap_or(config.discovery.max_depth);
        let mut follow_internal_links = config.discovery.follow_internal_links;
        match mode {
            DiscoveryMode::Shallow => {
                max_depth = 1;
                follow_internal_links = false;
            }
            DiscoveryMode::Deep => {}
            DiscoveryMode::Full => {
                // Unlimited unless an explicit depth was requested.
                if depth_override.is_none() {
                    max_depth = 0;
                }
            }
        }

        info!(
            session = %self.session_id,
            %mode,
            max_depth,
            resume = resume.as_deref().unwrap_or("-"),
            "starting discovery session"
        );

        let storage = Storage::open(&config.storage.database).await?;
        storage.run_migrations().await?;

        let config_snapshot = serde_json::to_value(config)
            .map_err(|e| CrawlError::Config(format!("config snapshot: {e}")))?;
        storage
            .create_session(&self.session_id, &mode.to_string(), max_depth, &config_snapshot)
            .await?;

        let result = self
            .run_inner(&storage, max_depth, follow_internal_links, resume, tx)
            .await;

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                error!(session = %self.session_id, "discovery failed: {e}");
                let _ = storage
                    .finish_session(&self.session_id, SessionStatus::Failed, None)
                    .await;
                storage.close().await;
                return Err(e);
            }
        };

        storage.close().await;
        info!(
            session = %summary.session_id,
            status = %summary.status,
            pages = summary.counters.pages_visited,
            new_links = summary.counters.new_links,
            "discovery session finished"
        );
        Ok(summary)
    }

    async fn run_inner(
        &self,
        storage: &Storage,
        max_depth: u32,
        follow_internal_links: bool,
        resume: Option<String>,
        tx: mpsc::Sender<PdfEvent>,
    ) -> Result<SessionSummary, CrawlError> {
        let config = &self.config;
        let selection: SelectionStrategy = config.proxy.selection.parse()?;

        // Proxy pool: losing it degrades to direct requests, never fatal.
        let proxy_pool = if config.proxy.enabled {
            let pool = Arc::new(ProxyPool::new(config.proxy.clone())?);
            match pool.initialize().await {
                Ok(count) => info!(proxies = count, "proxy pool ready"),
                Err(e) => warn!("proxy pool initialization failed, crawling direct: {e}"),
            }
            if pool.is_stale().await {
                if let Err(e) = pool.refresh().await {
                    warn!("proxy pool refresh failed: {e}");
                }
            }
            Some(pool)
        } else {
            None
        };

        let ua_pool = Arc::new(UserAgentPool::load(&config.user_agent));
        let rate_limiter = Arc::new(AdaptiveRateLimiter::new(&config.rate_limiting));
        let captcha = config
            .captcha
            .auto_detect
            .then(|| Arc::new(CaptchaDetector::new(&config.captcha)));
        let behavior = config
            .behavior
            .simulate_human
            .then(|| Arc::new(BehaviorSimulator::new(&config.behavior)));

        // The browser routes through one pool proxy for its lifetime;
        // per-request rotation covers the plain-HTTP paths.
        let launch_proxy = match &proxy_pool {
            Some(pool) => pool.next_proxy(selection).await.map(|p| p.endpoint),
            None => None,
        };
        let browser: Arc<dyn Browser> =
            Arc::new(ChromeBrowser::launch(&config.browser, launch_proxy.as_deref())?);

        let validator = Arc::new(UrlValidator::new(
            proxy_pool.clone(),
            ua_pool.clone(),
            selection,
            Duration::from_secs(config.discovery.validate_timeout_seconds),
        ));

        if let Some(pool) = &proxy_pool {
            self.snapshot_proxy_health(storage, pool).await;
        }

        // --- Seed generation ---
        let seeds = self
            .collect_seeds(storage, &rate_limiter, &browser)
            .await;
        info!(count = seeds.len(), "seed URLs ready");

        // --- Crawl ---
        let resume_checkpoint = resume.map(|old_session| {
            Checkpoint::path_for(&PathBuf::from(&config.discovery.session_dir), &old_session)
        });

        let mut crawler = DeepCrawler::new(
            config,
            self.session_id.clone(),
            max_depth,
            follow_internal_links,
            browser,
            proxy_pool.clone(),
            ua_pool,
            rate_limiter,
            captcha,
            behavior,
            validator,
            storage.clone(),
            self.cancel.clone(),
        )?;
        crawler.initialize(seeds, resume_checkpoint.as_ref());

        let (event_tx, mut event_rx) = mpsc::channel::<PdfEvent>(256);
        let crawl_handle = tokio::spawn(async move {
            let result = crawler.crawl(event_tx).await;
            (crawler, result)
        });

        let mut emitted: u64 = 0;
        while let Some(event) = event_rx.recv().await {
            emitted += 1;
            if emitted % 100 == 0 {
                self.refresh_counters(storage, emitted).await;
            }
            if tx.send(event).await.is_err() {
                debug!("event consumer hung up");
                self.cancel.cancel();
            }
        }

        let (crawler, crawl_result) = crawl_handle
            .await
            .map_err(|e| CrawlError::Other(anyhow::anyhow!("crawl task panicked: {e}")))?;
        let stats = crawl_result?;

        let mut counters = self.link_counters(storage).await;
        counters.pages_visited = stats.pages_visited as i64;
        counters.links_found = stats.pdfs_found as i64;
        counters.duplicates = stats.duplicates as i64;
        counters.errors = stats.errors as i64;
        counters.captchas = stats.captchas as i64;
        storage
            .update_session_counters(&self.session_id, &counters)
            .await?;

        if let Some(pool) = &proxy_pool {
            self.snapshot_proxy_health(storage, pool).await;
        }

        let status = if self.cancel.is_cancelled() {
            SessionStatus::Interrupted
        } else {
            SessionStatus::Completed
        };
        let checkpoint_summary = serde_json::json!({
            "checkpoint": crawler.checkpoint_path(),
            "visited": crawler.visited_len(),
            "queued": crawler.queue_len(),
        });
        storage
            .finish_session(&self.session_id, status, Some(&checkpoint_summary))
            .await?;

        Ok(SessionSummary {
            session_id: self.session_id.clone(),
            status,
            counters,
        })
    }

    /// Run every enabled strategy sequentially and merge their seeds with
    /// the configured site paths, first-seen deduplicated. One strategy
    /// failing never stops the others.
    async fn collect_seeds(
        &self,
        storage: &Storage,
        rate_limiter: &Arc<AdaptiveRateLimiter>,
        browser: &Arc<dyn Browser>,
    ) -> Vec<CrawlEntry> {
        let config = &self.config;
        let mut strategies: Vec<Box<dyn SeedStrategy>> = Vec::new();

        match SitemapStrategy::new(config.sitemap.clone(), rate_limiter.clone()) {
            Ok(s) => strategies.push(Box::new(s)),
            Err(e) => warn!("sitemap strategy unavailable: {e}"),
        }
        match PatternGeneratorStrategy::new(config.pattern_generator.clone(), storage.clone()) {
            Ok(s) => strategies.push(Box::new(s)),
            Err(e) => warn!("pattern generator unavailable: {e}"),
        }
        match SearchExplorerStrategy::new(
            config.search_explorer.clone(),
            config.sites.clone(),
            rate_limiter.clone(),
        ) {
            Ok(s) => strategies.push(Box::new(s)),
            Err(e) => warn!("search explorer unavailable: {e}"),
        }
        match TaxonomyStrategy::new(
            config.taxonomy.clone(),
            config.sites.clone(),
            Some(browser.clone()),
        ) {
            Ok(s) => strategies.push(Box::new(s)),
            Err(e) => warn!("taxonomy strategy unavailable: {e}"),
        }
        match FormDiscoveryStrategy::new(config.form_discovery.clone(), rate_limiter.clone()) {
            Ok(s) => strategies.push(Box::new(s)),
            Err(e) => warn!("form discovery unavailable: {e}"),
        }
        match ArchiveProbeStrategy::new(
            config.archive_probe.clone(),
            config.sites.clone(),
            rate_limiter.clone(),
        ) {
            Ok(s) => strategies.push(Box::new(s)),
            Err(e) => warn!("archive probe unavailable: {e}"),
        }

        let mut entries: Vec<CrawlEntry> = Vec::new();
        for strategy in &mut strategies {
            if !strategy.enabled() {
                debug!(strategy = strategy.name(), "strategy disabled");
                continue;
            }
            info!(strategy = strategy.name(), "running seed strategy");
            if let Err(e) = strategy.initialize().await {
                error!(strategy = strategy.name(), "initialization failed: {e}");
                continue;
            }
            match strategy.discover().await {
                Ok(result) => {
                    info!(
                        strategy = strategy.name(),
                        seeds = result.seed_urls.len(),
                        metadata = %result.metadata,
                        "strategy finished"
                    );
                    let method = strategy.method();
                    entries.extend(
                        result
                            .seed_urls
                            .into_iter()
                            .map(|url| CrawlEntry::seed(url, method)),
                    );
                }
                Err(e) => error!(strategy = strategy.name(), "strategy failed: {e}"),
            }
            strategy.cleanup().await;
        }

        // Config-derived site seeds come after strategy output, like the
        // rest first-seen deduplicated below.
        for site in &self.config.sites {
            if !site.enabled || site.base_url.is_empty() {
                continue;
            }
            let base = site.base_url.trim_end_matches('/');
            for path in &site.paths {
                if path.is_empty() {
                    continue;
                }
                let url = format!("{}/{}", base, path.trim_start_matches('/'));
                entries.push(CrawlEntry::seed(url, ExtractionMethod::Seed));
            }
        }

        let normalizer = UrlNormalizer::new(self.config.discovery.pdf_identity_params.clone());
        let mut seen = HashSet::with_capacity(entries.len());
        entries.retain(|e| seen.insert(normalizer.normalize(&e.url)));
        entries
    }

    async fn refresh_counters(&self, storage: &Storage, emitted: u64) {
        let counters = self.link_counters(storage).await;
        debug!(emitted, new_links = counters.new_links, "updating session counters");
        if let Err(e) = storage
            .update_session_counters(&self.session_id, &counters)
            .await
        {
            error!("failed to update session counters: {e}");
        }
    }

    async fn link_counters(&self, storage: &Storage) -> SessionCounters {
        let mut counters = SessionCounters::default();
        match storage.count_session_links_by_status(&self.session_id).await {
            Ok(rows) => {
                for (status, count) in rows {
                    counters.new_links += count;
                    match status.as_str() {
                        "accessible" => counters.accessible = count,
                        "broken" => counters.broken = count,
                        "blocked" => counters.blocked = count,
                        _ => {}
                    }
                }
            }
            Err(e) => error!("failed to count session links: {e}"),
        }
        counters
    }

    async fn snapshot_proxy_health(&self, storage: &Storage, pool: &Arc<ProxyPool>) {
        let rows: Vec<ProxyHealthRow> = pool
            .snapshot()
            .await
            .into_iter()
            .map(proxy_health_row)
            .collect();
        if rows.is_empty() {
            return;
        }
        if let Err(e) = storage.upsert_proxy_health(&rows).await {
            error!("failed to snapshot proxy health: {e}");
        }
    }
}

fn proxy_health_row(record: ProxyRecord) -> ProxyHealthRow {
    let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| t.map(|t| t.to_rfc3339());
    ProxyHealthRow {
        endpoint: record.endpoint,
        source: record.source,
        protocol: record.protocol.as_str().to_string(),
        host: record.host,
        port: record.port as i64,
        country: record.country,
        anonymity: record.anonymity,
        https: record.https,
        score: record.score,
        total_requests: record.total_requests as i64,
        successful_requests: record.successful_requests as i64,
        failed_requests: record.failed_requests as i64,
        avg_response_time: record.avg_response_time,
        last_used: fmt(record.last_used),
        last_success: fmt(record.last_success),
        last_error: fmt(record.last_error),
        last_error_msg: record.last_error_msg,
        is_healthy: record.is_healthy,
        last_check: fmt(record.last_check),
    }
}
