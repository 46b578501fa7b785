use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

use juriscrape_core::config::ProxyConfig;
use juriscrape_core::CrawlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            "socks4" => Some(ProxyProtocol::Socks4),
            "socks5" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }
}

/// One proxy endpoint with health tracking. Identified by `endpoint`
/// (`scheme://host:port`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub endpoint: String,
    pub source: String,
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub anonymity: Option<String>,
    #[serde(default)]
    pub https: bool,
    pub score: f64,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub successful_requests: u64,
    #[serde(default)]
    pub failed_requests: u64,
    #[serde(default)]
    pub avg_response_time: Option<f64>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error_msg: Option<String>,
    #[serde(default = "default_healthy")]
    pub is_healthy: bool,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
}

fn default_healthy() -> bool {
    true
}

impl ProxyRecord {
    fn new(protocol: ProxyProtocol, host: String, port: u16, source: &str) -> Self {
        Self {
            endpoint: format!("{}://{}:{}", protocol.as_str(), host, port),
            source: source.to_string(),
            protocol,
            host,
            port,
            country: None,
            anonymity: None,
            https: matches!(protocol, ProxyProtocol::Https | ProxyProtocol::Socks5),
            score: 50.0,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            avg_response_time: None,
            last_used: None,
            last_success: None,
            last_error: None,
            last_error_msg: None,
            is_healthy: true,
            last_check: Some(Utc::now()),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    /// Score is a pure function of the other fields, recomputed on every
    /// state change. A never-used proxy scores exactly 50.
    pub fn update_score(&mut self, now: DateTime<Utc>) {
        let success_component = self.success_rate() * 50.0;

        let rtt_component = match self.avg_response_time {
            Some(rtt) if rtt <= 2.0 => 25.0,
            Some(rtt) if rtt <= 5.0 => 15.0,
            Some(_) => 5.0,
            None => 0.0,
        };

        let recency_bonus = match self.last_success {
            Some(t) => match hours_since(now, t) {
                h if h < 1.0 => 15.0,
                h if h < 6.0 => 10.0,
                _ => 0.0,
            },
            None => 0.0,
        };

        let failure_penalty = match self.last_error {
            Some(t) => match hours_since(now, t) {
                h if h < 1.0 => 20.0,
                h if h < 6.0 => 10.0,
                _ => 0.0,
            },
            None => 0.0,
        };

        let score = success_component + rtt_component + recency_bonus - failure_penalty;
        self.score = score.clamp(0.0, 100.0);
    }

    fn record_success(&mut self, rtt: Option<f64>, now: DateTime<Utc>, ewma_weight: f64) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.last_success = Some(now);
        self.is_healthy = true;
        if let Some(rtt) = rtt {
            self.avg_response_time = Some(match self.avg_response_time {
                Some(avg) => avg * ewma_weight + rtt * (1.0 - ewma_weight),
                None => rtt,
            });
        }
        self.update_score(now);
    }

    fn record_failure(&mut self, error: Option<&str>, now: DateTime<Utc>) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.last_error = Some(now);
        self.last_error_msg = error.map(|e| e.to_string());
        self.update_score(now);
    }
}

fn hours_since(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    (now - then).num_seconds().max(0) as f64 / 3600.0
}

/// How `next_proxy` picks from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// Score-weighted random among proxies scoring >= 30.
    #[default]
    Weighted,
    RoundRobin,
    Random,
    /// Highest score, ties broken by most recent success.
    Best,
}

impl FromStr for SelectionStrategy {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted" => Ok(SelectionStrategy::Weighted),
            "round_robin" => Ok(SelectionStrategy::RoundRobin),
            "random" => Ok(SelectionStrategy::Random),
            "best" => Ok(SelectionStrategy::Best),
            other => Err(CrawlError::Config(format!(
                "unknown proxy selection strategy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProxyStats {
    pub total: usize,
    pub healthy: usize,
    pub high_score: usize,
    pub total_fetched: u64,
    pub total_validated: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheMeta {
    #[serde(default)]
    total_fetched: u64,
    #[serde(default)]
    total_validated: u64,
    #[serde(default)]
    last_refresh: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    proxies: Vec<ProxyRecord>,
    #[serde(default)]
    stats: CacheMeta,
    saved_at: DateTime<Utc>,
}

struct PoolState {
    proxies: Vec<ProxyRecord>,
    /// Pruned from the active pool but still cached while their last
    /// check is recent, so a refresh can reconsider them.
    pruned: Vec<ProxyRecord>,
    round_robin: usize,
    results_since_flush: u64,
    meta: CacheMeta,
}

/// The shared proxy pool: fetches candidates from plain-text sources,
/// validates them through themselves, scores every result and hands out
/// endpoints per the configured rotation strategy.
pub struct ProxyPool {
    config: ProxyConfig,
    fetch_client: reqwest::Client,
    state: Mutex<PoolState>,
}

const MAX_LINES_PER_SOURCE: usize = 1000;
const PRUNE_SCORE: f64 = 10.0;
const HEALTHY_SCORE: f64 = 30.0;
const FLUSH_EVERY: u64 = 10;

impl ProxyPool {
    pub fn new(config: ProxyConfig) -> Result<Self, CrawlError> {
        let fetch_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self {
            config,
            fetch_client,
            state: Mutex::new(PoolState {
                proxies: Vec::new(),
                pruned: Vec::new(),
                round_robin: 0,
                results_since_flush: 0,
                meta: CacheMeta::default(),
            }),
        })
    }

    /// Adopt the cache when it holds enough records, otherwise refresh.
    pub async fn initialize(&self) -> Result<usize, CrawlError> {
        match self.load_cache() {
            Ok(Some(cache)) if cache.proxies.len() >= self.config.min_required => {
                let count = cache.proxies.len();
                let mut state = self.state.lock().await;
                let (active, pruned): (Vec<_>, Vec<_>) = cache
                    .proxies
                    .into_iter()
                    .partition(|p| p.score >= PRUNE_SCORE);
                state.proxies = active;
                state.pruned = pruned;
                state.meta = cache.stats;
                info!(count, active = state.proxies.len(), "loaded proxy pool from cache");
                return Ok(count);
            }
            Ok(Some(cache)) => {
                debug!(
                    cached = cache.proxies.len(),
                    required = self.config.min_required,
                    "proxy cache too small, refreshing"
                );
            }
            Ok(None) => {}
            Err(e) => warn!("failed to load proxy cache: {e}"),
        }

        self.refresh().await?;
        Ok(self.state.lock().await.proxies.len())
    }

    /// Fetch every source, validate candidates with bounded concurrency,
    /// merge into the pool and rewrite the cache.
    pub async fn refresh(&self) -> Result<(), CrawlError> {
        let fetched = self.fetch_all_sources().await;
        info!(count = fetched.len(), "fetched proxy candidates from sources");

        let candidates = self.dedup_candidates(fetched).await;
        let validated = self.validate_candidates(candidates).await;
        info!(count = validated.len(), "validated proxies");

        let mut state = self.state.lock().await;
        state.meta.total_fetched += validated.len() as u64;
        state.meta.total_validated = validated.len() as u64;
        state.meta.last_refresh = Some(Utc::now());

        let now = Utc::now();
        for proxy in validated {
            if !state.proxies.iter().any(|p| p.endpoint == proxy.endpoint) {
                state.proxies.push(proxy);
            }
        }
        // A revalidated endpoint supersedes its pruned ghost.
        let active: std::collections::HashSet<String> =
            state.proxies.iter().map(|p| p.endpoint.clone()).collect();
        state.pruned.retain(|p| !active.contains(&p.endpoint));
        for proxy in &mut state.proxies {
            proxy.update_score(now);
        }
        state
            .proxies
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let dropped: Vec<ProxyRecord> = state
            .proxies
            .iter()
            .filter(|p| p.score < PRUNE_SCORE)
            .cloned()
            .collect();
        state.pruned.extend(dropped);
        state.proxies.retain(|p| p.score >= PRUNE_SCORE);

        let healthy = state.proxies.iter().filter(|p| p.is_healthy).count();
        info!(total = state.proxies.len(), healthy, "proxy pool refreshed");

        self.write_cache(&state);
        Ok(())
    }

    /// Whether the pool is due for a refresh per `refresh_hours`.
    pub async fn is_stale(&self) -> bool {
        let state = self.state.lock().await;
        match state.meta.last_refresh {
            Some(t) => hours_since(Utc::now(), t) >= self.config.refresh_hours as f64,
            None => state.proxies.is_empty(),
        }
    }

    async fn fetch_all_sources(&self) -> Vec<ProxyRecord> {
        let fetches = self.config.sources.iter().map(|source| {
            let client = self.fetch_client.clone();
            let source = source.clone();
            async move {
                match Self::fetch_source(&client, &source).await {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(source = %source, "proxy source fetch failed: {e}");
                        Vec::new()
                    }
                }
            }
        });
        futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn fetch_source(
        client: &reqwest::Client,
        source: &str,
    ) -> Result<Vec<ProxyRecord>, CrawlError> {
        let resp = client
            .get(source)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CrawlError::Network(format!(
                "source {source} returned HTTP {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        let records: Vec<ProxyRecord> = body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .take(MAX_LINES_PER_SOURCE)
            .filter_map(|line| parse_source_line(line, source))
            .collect();
        debug!(source = %source, count = records.len(), "parsed proxy source");
        Ok(records)
    }

    async fn dedup_candidates(&self, fetched: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
        let state = self.state.lock().await;
        let min_rank = self
            .config
            .min_anonymity
            .as_deref()
            .map(anonymity_rank)
            .unwrap_or(0);
        let mut seen: std::collections::HashSet<String> =
            state.proxies.iter().map(|p| p.endpoint.clone()).collect();
        fetched
            .into_iter()
            .filter(|p| !self.config.require_https || p.https)
            // Sources rarely report anonymity; only a known-lower class is rejected.
            .filter(|p| match p.anonymity.as_deref() {
                Some(level) => anonymity_rank(level) >= min_rank,
                None => true,
            })
            .filter(|p| seen.insert(p.endpoint.clone()))
            .collect()
    }

    async fn validate_candidates(&self, candidates: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_test_concurrency.max(1)));
        let test_url = self.config.test_url.clone();
        let timeout = Duration::from_secs(self.config.test_timeout_seconds);

        let checks = candidates.into_iter().map(|mut record| {
            let semaphore = Arc::clone(&semaphore);
            let test_url = test_url.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let started = Instant::now();
                match probe_through(&record.endpoint, &test_url, timeout).await {
                    Ok(()) => {
                        let rtt = started.elapsed().as_secs_f64();
                        record.record_success(Some(rtt), Utc::now(), 0.7);
                        record.last_check = Some(Utc::now());
                        Some(record)
                    }
                    Err(e) => {
                        debug!(endpoint = %record.endpoint, "proxy validation failed: {e}");
                        None
                    }
                }
            }
        });

        futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Pick the next proxy, or None when the pool is empty — the caller
    /// then proceeds without a proxy.
    pub async fn next_proxy(&self, strategy: SelectionStrategy) -> Option<ProxyRecord> {
        let mut state = self.state.lock().await;
        if state.proxies.is_empty() {
            warn!("proxy pool is empty, proceeding without proxy");
            return None;
        }

        let healthy: Vec<usize> = state
            .proxies
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_healthy && p.score >= HEALTHY_SCORE)
            .map(|(i, _)| i)
            .collect();
        let pool: Vec<usize> = if healthy.is_empty() {
            warn!("no proxy scores >= {HEALTHY_SCORE}, falling back to full pool");
            (0..state.proxies.len()).collect()
        } else {
            healthy
        };

        let mut rng = rand::thread_rng();
        let chosen = match strategy {
            SelectionStrategy::Weighted => {
                let weights: Vec<f64> =
                    pool.iter().map(|&i| state.proxies[i].score.max(1.0)).collect();
                let dist = WeightedIndex::new(&weights).ok()?;
                pool[dist.sample(&mut rng)]
            }
            SelectionStrategy::RoundRobin => {
                let idx = pool[state.round_robin % pool.len()];
                state.round_robin += 1;
                idx
            }
            SelectionStrategy::Random => *pool.choose(&mut rng)?,
            SelectionStrategy::Best => *pool.iter().max_by(|&&a, &&b| {
                let pa = &state.proxies[a];
                let pb = &state.proxies[b];
                pa.score
                    .partial_cmp(&pb.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(pa.last_success.cmp(&pb.last_success))
            })?,
        };

        state.proxies[chosen].last_used = Some(Utc::now());
        Some(state.proxies[chosen].clone())
    }

    /// Record the outcome of a request made through `endpoint`. Prunes
    /// the record when its score drops below 10 and flushes the cache
    /// every 10 results.
    pub async fn mark_result(
        &self,
        endpoint: &str,
        success: bool,
        rtt: Option<f64>,
        error: Option<&str>,
    ) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let Some(idx) = state.proxies.iter().position(|p| p.endpoint == endpoint) else {
            return;
        };

        if success {
            state.proxies[idx].record_success(rtt, now, 0.8);
        } else {
            state.proxies[idx].record_failure(error, now);
        }

        if state.proxies[idx].score < PRUNE_SCORE {
            let removed = state.proxies.remove(idx);
            debug!(endpoint = %removed.endpoint, score = removed.score, "proxy pruned");
            state.pruned.push(removed);
        }

        state.results_since_flush += 1;
        if state.results_since_flush >= FLUSH_EVERY {
            state.results_since_flush = 0;
            self.write_cache(&state);
        }
    }

    /// Recent failure rate of one endpoint, used to classify validation
    /// failures as blocked vs broken.
    pub async fn recent_failure_rate(&self, endpoint: &str) -> Option<f64> {
        let state = self.state.lock().await;
        state
            .proxies
            .iter()
            .find(|p| p.endpoint == endpoint)
            .map(|p| 1.0 - p.success_rate())
    }

    pub async fn stats(&self) -> ProxyStats {
        let state = self.state.lock().await;
        ProxyStats {
            total: state.proxies.len(),
            healthy: state.proxies.iter().filter(|p| p.is_healthy).count(),
            high_score: state.proxies.iter().filter(|p| p.score >= 70.0).count(),
            total_fetched: state.meta.total_fetched,
            total_validated: state.meta.total_validated,
            last_refresh: state.meta.last_refresh,
        }
    }

    pub async fn snapshot(&self) -> Vec<ProxyRecord> {
        self.state.lock().await.proxies.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.proxies.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.proxies.is_empty()
    }

    fn load_cache(&self) -> Result<Option<CacheFile>, CrawlError> {
        let path = Path::new(&self.config.cache_file);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| CrawlError::Storage(format!("read {}: {e}", path.display())))?;
        let cache: CacheFile = serde_json::from_str(&data)
            .map_err(|e| CrawlError::Parse(format!("proxy cache: {e}")))?;
        Ok(Some(cache))
    }

    // Temp-then-rename so a crash never leaves a torn cache behind.
    // Pruned proxies stay cached only while their last check is recent.
    fn write_cache(&self, state: &PoolState) {
        let now = Utc::now();
        let recent_pruned = state.pruned.iter().filter(|p| {
            p.last_check
                .map(|t| hours_since(now, t) < self.config.refresh_hours as f64)
                .unwrap_or(false)
        });
        let mut proxies = state.proxies.clone();
        proxies.extend(recent_pruned.cloned());
        let cache = CacheFile {
            proxies,
            stats: CacheMeta {
                total_fetched: state.meta.total_fetched,
                total_validated: state.meta.total_validated,
                last_refresh: state.meta.last_refresh,
            },
            saved_at: Utc::now(),
        };
        let path = Path::new(&self.config.cache_file);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("json.tmp");
        let result = serde_json::to_vec_pretty(&cache)
            .map_err(|e| e.to_string())
            .and_then(|bytes| std::fs::write(&tmp, bytes).map_err(|e| e.to_string()))
            .and_then(|_| std::fs::rename(&tmp, path).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("failed to write proxy cache: {e}");
        }
    }
}

async fn probe_through(
    endpoint: &str,
    test_url: &str,
    timeout: Duration,
) -> Result<(), CrawlError> {
    let proxy =
        reqwest::Proxy::all(endpoint).map_err(|e| CrawlError::Proxy(e.to_string()))?;
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| CrawlError::Proxy(e.to_string()))?;
    let resp = client
        .get(test_url)
        .send()
        .await
        .map_err(|e| CrawlError::Network(e.to_string()))?;
    if resp.status().as_u16() == 200 {
        Ok(())
    } else {
        Err(CrawlError::Network(format!("HTTP {}", resp.status())))
    }
}

fn anonymity_rank(level: &str) -> u8 {
    match level {
        "elite" => 3,
        "anonymous" => 2,
        "transparent" => 1,
        _ => 0,
    }
}

/// Parse one proxy source line: either `host:port` (http assumed) or
/// `scheme://host:port`.
fn parse_source_line(line: &str, source: &str) -> Option<ProxyRecord> {
    if line.contains("://") {
        let url = Url::parse(line).ok()?;
        let protocol = ProxyProtocol::parse(url.scheme())?;
        let host = url.host_str()?.to_string();
        let port = url.port()?;
        Some(ProxyRecord::new(protocol, host, port, source))
    } else {
        let (host, port) = line.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        Some(ProxyRecord::new(
            ProxyProtocol::Http,
            host.to_string(),
            port,
            source,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn test_config() -> ProxyConfig {
        ProxyConfig {
            cache_file: std::env::temp_dir()
                .join(format!("juriscrape-proxy-test-{}.json", std::process::id()))
                .to_string_lossy()
                .into_owned(),
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn parses_bare_host_port_as_http() {
        let record = parse_source_line("10.0.0.1:8080", "test").unwrap();
        assert_eq!(record.protocol, ProxyProtocol::Http);
        assert_eq!(record.endpoint, "http://10.0.0.1:8080");
        assert_eq!(record.port, 8080);
    }

    #[test]
    fn parses_scheme_prefixed_line() {
        let record = parse_source_line("socks5://10.0.0.2:1080", "test").unwrap();
        assert_eq!(record.protocol, ProxyProtocol::Socks5);
        assert!(record.https);
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(parse_source_line("not-a-proxy", "test").is_none());
        assert!(parse_source_line("host:notaport", "test").is_none());
        assert!(parse_source_line("ftp://10.0.0.1:21", "test").is_none());
    }

    #[test]
    fn fresh_record_scores_exactly_fifty() {
        let mut record =
            ProxyRecord::new(ProxyProtocol::Http, "10.0.0.1".to_string(), 8080, "test");
        record.last_check = None;
        record.update_score(Utc::now());
        assert_eq!(record.score, 50.0);
    }

    #[test]
    fn scoring_matches_reference_values() {
        let now = Utc::now();
        let mut record =
            ProxyRecord::new(ProxyProtocol::Http, "10.0.0.1".to_string(), 8080, "test");
        record.total_requests = 10;
        record.successful_requests = 10;
        record.avg_response_time = Some(1.0);
        record.last_success = Some(now);
        record.update_score(now);
        assert!((record.score - 90.0).abs() < 1e-9);

        // One failure right now: (10/11)*50 + 25 + 15 - 20 = 65.45...
        record.record_failure(Some("HTTP 503"), now);
        assert!((record.score - 65.4545).abs() < 0.01);
    }

    #[test]
    fn slow_proxies_earn_smaller_rtt_component() {
        let now = Utc::now();
        let mut record =
            ProxyRecord::new(ProxyProtocol::Http, "10.0.0.1".to_string(), 8080, "test");
        record.total_requests = 4;
        record.successful_requests = 4;
        record.avg_response_time = Some(3.0);
        record.update_score(now);
        assert_eq!(record.score, 65.0);

        record.avg_response_time = Some(8.0);
        record.update_score(now);
        assert_eq!(record.score, 55.0);
    }

    #[test]
    fn stale_success_loses_recency_bonus() {
        let now = Utc::now();
        let mut record =
            ProxyRecord::new(ProxyProtocol::Http, "10.0.0.1".to_string(), 8080, "test");
        record.total_requests = 2;
        record.successful_requests = 2;
        record.last_success = Some(now - ChronoDuration::hours(3));
        record.update_score(now);
        assert_eq!(record.score, 60.0);

        record.last_success = Some(now - ChronoDuration::hours(12));
        record.update_score(now);
        assert_eq!(record.score, 50.0);
    }

    #[tokio::test]
    async fn empty_pool_selects_nothing() {
        let pool = ProxyPool::new(test_config()).unwrap();
        assert!(pool.next_proxy(SelectionStrategy::Weighted).await.is_none());
    }

    #[tokio::test]
    async fn round_robin_cycles_and_prunes_failures() {
        let pool = ProxyPool::new(test_config()).unwrap();
        {
            let mut state = pool.state.lock().await;
            for i in 0..3 {
                state.proxies.push(ProxyRecord::new(
                    ProxyProtocol::Http,
                    format!("10.0.0.{i}"),
                    8080,
                    "test",
                ));
            }
        }

        let first = pool.next_proxy(SelectionStrategy::RoundRobin).await.unwrap();
        let second = pool.next_proxy(SelectionStrategy::RoundRobin).await.unwrap();
        assert_ne!(first.endpoint, second.endpoint);

        // Hammer one endpoint with failures until its score collapses.
        for _ in 0..20 {
            pool.mark_result(&first.endpoint, false, None, Some("timeout"))
                .await;
        }
        let remaining = pool.snapshot().await;
        assert!(remaining.iter().all(|p| p.endpoint != first.endpoint));
        assert_eq!(remaining.len(), 2);

        let _ = std::fs::remove_file(&pool.config.cache_file);
    }

    #[tokio::test]
    async fn selection_falls_back_when_all_scores_low() {
        let pool = ProxyPool::new(test_config()).unwrap();
        {
            let mut state = pool.state.lock().await;
            let mut record =
                ProxyRecord::new(ProxyProtocol::Http, "10.0.0.1".to_string(), 8080, "test");
            record.score = 15.0;
            state.proxies.push(record);
        }
        let chosen = pool.next_proxy(SelectionStrategy::Best).await;
        assert!(chosen.is_some());
    }
}
