use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use juriscrape_browser::BehaviorSimulator;
use juriscrape_core::page::Browser;
use juriscrape_core::types::{CrawlEntry, CrawlStats, ExtractionMethod, PdfEvent};
use juriscrape_core::{AppConfig, CancelFlag, CrawlError, UrlNormalizer};
use juriscrape_extract::{CaptchaAction, CaptchaDetector, LinkExtractor};
use juriscrape_frontier::{Checkpoint, Frontier};
use juriscrape_net::proxy::{ProxyPool, ProxyRecord, SelectionStrategy};
use juriscrape_net::{AdaptiveRateLimiter, UrlValidator, UserAgentPool};
use juriscrape_storage::{NewPdfLink, Storage};

/// Breadth-first deep crawler. One sequential dequeue loop; parallelism
/// lives below it (proxy validation, the HTTP client's pool), never in
/// the loop itself — emission order and rate-limit behavior depend on
/// serial processing.
pub struct DeepCrawler {
    session_id: String,
    browser: Arc<dyn Browser>,
    proxy_pool: Option<Arc<ProxyPool>>,
    ua_pool: Arc<UserAgentPool>,
    rate_limiter: Arc<AdaptiveRateLimiter>,
    captcha: Option<Arc<CaptchaDetector>>,
    behavior: Option<Arc<BehaviorSimulator>>,
    validator: Arc<UrlValidator>,
    extractor: LinkExtractor,
    normalizer: UrlNormalizer,
    storage: Storage,
    frontier: Frontier,
    cancel: CancelFlag,

    max_depth: u32,
    follow_internal_links: bool,
    validate_on_discovery: bool,
    deduplicate: bool,
    save_interval: u64,
    navigation_timeout: Duration,
    selection: SelectionStrategy,
    rotate_proxy_per_request: bool,
    rotate_proxy_on_error: bool,
    current_proxy: Option<ProxyRecord>,
    checkpoint_path: PathBuf,
    pages_at_last_checkpoint: u64,
}

impl DeepCrawler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AppConfig,
        session_id: String,
        max_depth: u32,
        follow_internal_links: bool,
        browser: Arc<dyn Browser>,
        proxy_pool: Option<Arc<ProxyPool>>,
        ua_pool: Arc<UserAgentPool>,
        rate_limiter: Arc<AdaptiveRateLimiter>,
        captcha: Option<Arc<CaptchaDetector>>,
        behavior: Option<Arc<BehaviorSimulator>>,
        validator: Arc<UrlValidator>,
        storage: Storage,
        cancel: CancelFlag,
    ) -> Result<Self, CrawlError> {
        let normalizer = UrlNormalizer::new(config.discovery.pdf_identity_params.clone());
        let selection = config.proxy.selection.parse()?;
        let session_dir = PathBuf::from(&config.discovery.session_dir);
        let checkpoint_path = Checkpoint::path_for(&session_dir, &session_id);
        Ok(Self {
            session_id,
            browser,
            proxy_pool,
            ua_pool,
            rate_limiter,
            captcha,
            behavior,
            validator,
            extractor: LinkExtractor::new(normalizer.clone()),
            normalizer,
            storage,
            frontier: Frontier::new(UrlNormalizer::new(
                config.discovery.pdf_identity_params.clone(),
            )),
            cancel,
            max_depth,
            follow_internal_links,
            validate_on_discovery: config.discovery.validate_on_discovery,
            deduplicate: config.discovery.deduplicate,
            save_interval: config.discovery.save_interval.max(1),
            navigation_timeout: Duration::from_secs(config.browser.navigation_timeout_seconds),
            selection,
            rotate_proxy_per_request: config.proxy.rotate_per_request,
            rotate_proxy_on_error: config.proxy.rotate_on_error,
            current_proxy: None,
            checkpoint_path,
            pages_at_last_checkpoint: 0,
        })
    }

    /// Seed the frontier, or restore it from the checkpoint written by
    /// `resume_from` in an earlier run.
    pub fn initialize(&mut self, seeds: Vec<CrawlEntry>, resume_from: Option<&PathBuf>) {
        if let Some(path) = resume_from {
            match Checkpoint::load(path) {
                Ok(checkpoint) => {
                    self.frontier.restore(checkpoint);
                    info!(
                        visited = self.frontier.visited_len(),
                        queued = self.frontier.queue_len(),
                        "resumed crawler from checkpoint"
                    );
                    return;
                }
                Err(e) => warn!(path = %path.display(), "checkpoint unusable, starting fresh: {e}"),
            }
        }
        let queued = self.frontier.seed_all(seeds);
        info!(seeds = queued, "crawler initialized");
    }

    /// Run the visit loop to exhaustion or cancellation. Emits every
    /// discovered PDF on `tx` in page-close order.
    pub async fn crawl(&mut self, tx: mpsc::Sender<PdfEvent>) -> Result<CrawlStats, CrawlError> {
        while !self.cancel.is_cancelled() {
            let Some(entry) = self.frontier.pop() else {
                break;
            };

            if self.frontier.is_visited(&entry.url) {
                continue;
            }
            if self.max_depth > 0 && entry.depth >= self.max_depth {
                debug!(url = %entry.url, depth = entry.depth, "depth limit reached");
                continue;
            }

            self.rate_limiter.wait().await;
            if self.cancel.is_cancelled() {
                // Not processed: put it back so a resume retries it.
                self.frontier.push_front(entry);
                break;
            }

            if let Err(e) = self.visit(&entry, &tx).await {
                self.frontier.stats.errors += 1;
                warn!(url = %entry.url, "visit failed: {e}");
            }

            if self.frontier.stats.pages_visited - self.pages_at_last_checkpoint
                >= self.save_interval
            {
                self.pages_at_last_checkpoint = self.frontier.stats.pages_visited;
                self.save_checkpoint();
            }
        }

        self.save_checkpoint();
        info!(stats = ?self.frontier.stats, "crawl finished");
        Ok(self.frontier.stats)
    }

    /// One frontier iteration: navigate, classify, extract, persist,
    /// enqueue. Errors here never escape the iteration.
    async fn visit(
        &mut self,
        entry: &CrawlEntry,
        tx: &mpsc::Sender<PdfEvent>,
    ) -> Result<(), CrawlError> {
        let proxy = self.acquire_proxy().await;
        let user_agent = self.ua_pool.current();

        let page = self.browser.new_page().await?;
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), user_agent);
        if let Err(e) = page.set_extra_http_headers(headers).await {
            debug!("could not set headers: {e}");
        }

        debug!(
            url = %entry.url,
            depth = entry.depth,
            proxy = proxy.as_ref().map(|p| p.endpoint.as_str()).unwrap_or("direct"),
            "visiting"
        );

        let started = Instant::now();
        let response = match page.goto(&entry.url, self.navigation_timeout).await {
            Ok(response) => response,
            Err(e) => {
                self.mark_proxy(&proxy, false, None, Some(&e.to_string())).await;
                if self.rotate_proxy_on_error {
                    self.current_proxy = None;
                }
                let _ = page.close().await;
                return Err(e);
            }
        };
        let rtt = started.elapsed().as_secs_f64();
        // The transport worked; HTTP-level trouble is not the proxy's fault.
        self.mark_proxy(&proxy, true, Some(rtt), None).await;

        if response.status == 429 {
            warn!(url = %entry.url, "rate limited by server");
            self.rate_limiter.on_429().await;
            if self.rotate_proxy_on_error {
                self.current_proxy = None;
            }
            let _ = page.close().await;
            return Ok(());
        }
        if response.status >= 400 {
            warn!(url = %entry.url, status = response.status, "error response, skipping");
            if self.rotate_proxy_on_error {
                self.current_proxy = None;
            }
            let _ = page.close().await;
            return Ok(());
        }
        self.rate_limiter.on_success().await;

        if let Some(captcha) = self.captcha.clone() {
            if let Some(reason) = captcha.check(page.as_ref()).await {
                self.frontier.stats.captchas += 1;
                match captcha.resolve(page.as_ref(), &self.session_id, &reason).await {
                    CaptchaAction::Abort => {
                        self.cancel.cancel();
                        let _ = page.close().await;
                        return Ok(());
                    }
                    CaptchaAction::Skip => {
                        let _ = page.close().await;
                        return Ok(());
                    }
                    CaptchaAction::Continue => {
                        // Only proceed when the challenge actually cleared;
                        // otherwise leave the URL unvisited for a retry.
                        if captcha.check(page.as_ref()).await.is_some() {
                            let _ = page.close().await;
                            return Ok(());
                        }
                    }
                }
            }
        }

        if entry.depth == 0 {
            if let Some(behavior) = &self.behavior {
                behavior.simulate(page.as_ref()).await;
            }
        }

        let pdfs = self.extractor.extract_pdfs(page.as_ref(), &entry.url, entry.depth).await;
        for pdf in pdfs {
            self.frontier.stats.pdfs_found += 1;
            let normalized = self.normalizer.normalize(&pdf.url);

            let link = NewPdfLink {
                url: pdf.url.clone(),
                normalized_url: normalized.clone(),
                source_url: pdf.source_url.clone(),
                session_id: self.session_id.clone(),
                extraction_method: pdf.method.as_str().to_string(),
                confidence: pdf.confidence,
                metadata: serde_json::json!({
                    "depth": pdf.depth,
                    "source": pdf.source_url,
                }),
            };
            let inserted = match self.storage.insert_pdf_link(&link).await {
                Ok(inserted) => inserted,
                Err(e) => {
                    error!(url = %pdf.url, "failed to store link: {e}");
                    self.frontier.stats.errors += 1;
                    continue;
                }
            };
            if !inserted {
                self.frontier.stats.duplicates += 1;
                if self.deduplicate {
                    debug!(url = %normalized, "duplicate PDF");
                    continue;
                }
            }

            let mut validation = None;
            if inserted && self.validate_on_discovery {
                let (outcome, status) = self.validator.validate(&pdf.url).await;
                if let Err(e) = self.storage.update_validation(&normalized, &outcome, status).await
                {
                    error!(url = %normalized, "failed to record validation: {e}");
                }
                validation = Some(outcome);
            }

            let event = PdfEvent {
                url: pdf.url,
                source_url: pdf.source_url,
                depth: pdf.depth,
                method: pdf.method,
                validation,
            };
            if tx.send(event).await.is_err() {
                // Consumer hung up; treat it like cancellation.
                self.cancel.cancel();
                let _ = page.close().await;
                return Ok(());
            }
        }

        if self.follow_internal_links && (self.max_depth == 0 || entry.depth < self.max_depth) {
            let links = self.extractor.extract_internal_links(page.as_ref(), &entry.url).await;
            for link in links {
                let queued = self.frontier.push_if_unvisited(CrawlEntry {
                    url: link,
                    depth: entry.depth + 1,
                    source_url: Some(entry.url.clone()),
                    method: ExtractionMethod::InternalLink,
                });
                if queued {
                    self.frontier.stats.internal_links_found += 1;
                }
            }
        }

        // Visited only once the page closed cleanly; a failure leaves the
        // URL eligible for a future attempt.
        page.close().await?;
        self.frontier.mark_visited(&entry.url);
        self.frontier.stats.pages_visited += 1;
        Ok(())
    }

    async fn acquire_proxy(&mut self) -> Option<ProxyRecord> {
        let pool = self.proxy_pool.clone()?;
        if self.rotate_proxy_per_request || self.current_proxy.is_none() {
            self.current_proxy = pool.next_proxy(self.selection).await;
        }
        self.current_proxy.clone()
    }

    async fn mark_proxy(
        &self,
        proxy: &Option<ProxyRecord>,
        success: bool,
        rtt: Option<f64>,
        error: Option<&str>,
    ) {
        if let (Some(pool), Some(record)) = (&self.proxy_pool, proxy) {
            pool.mark_result(&record.endpoint, success, rtt, error).await;
        }
    }

    /// Best effort: a failed write is logged and retried at the next
    /// interval, never fatal.
    fn save_checkpoint(&self) {
        let checkpoint = self.frontier.to_checkpoint(&self.session_id);
        match checkpoint.save(&self.checkpoint_path) {
            Ok(()) => debug!(
                visited = self.frontier.visited_len(),
                queued = self.frontier.queue_len(),
                "checkpoint saved"
            ),
            Err(e) => error!("checkpoint write failed: {e}"),
        }
    }

    pub fn checkpoint_path(&self) -> &PathBuf {
        &self.checkpoint_path
    }

    pub fn queue_len(&self) -> usize {
        self.frontier.queue_len()
    }

    pub fn visited_len(&self) -> usize {
        self.frontier.visited_len()
    }
}
