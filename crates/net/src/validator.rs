use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use juriscrape_core::types::{LinkStatus, ValidationOutcome};

use crate::proxy::{ProxyPool, SelectionStrategy};
use crate::ua::UserAgentPool;

/// Probes a PDF URL with a redirect-following HEAD request through a
/// rotated proxy and user agent. Never downloads a body.
pub struct UrlValidator {
    pool: Option<Arc<ProxyPool>>,
    ua: Arc<UserAgentPool>,
    strategy: SelectionStrategy,
    timeout: Duration,
}

const MAX_REDIRECTS: usize = 10;
const BLOCKED_FAILURE_RATE: f64 = 0.5;

impl UrlValidator {
    pub fn new(
        pool: Option<Arc<ProxyPool>>,
        ua: Arc<UserAgentPool>,
        strategy: SelectionStrategy,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            ua,
            strategy,
            timeout,
        }
    }

    /// Issue the HEAD probe. Returns the raw outcome plus the link status
    /// it implies: accessible on 200, broken on an HTTP error, blocked on
    /// a network failure through a proxy that has been failing recently.
    pub async fn validate(&self, url: &str) -> (ValidationOutcome, LinkStatus) {
        let proxy = match &self.pool {
            Some(pool) => pool.next_proxy(self.strategy).await,
            None => None,
        };

        let redirects = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&redirects);
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            if attempt.previous().len() > MAX_REDIRECTS {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .redirect(policy)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true);
        if let Some(record) = &proxy {
            match reqwest::Proxy::all(&record.endpoint) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => debug!(endpoint = %record.endpoint, "bad proxy endpoint: {e}"),
            }
        }
        let client = match builder.build() {
            Ok(c) => c,
            Err(e) => {
                return (
                    ValidationOutcome {
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                    LinkStatus::Broken,
                );
            }
        };

        let started = Instant::now();
        let result = client
            .head(url)
            .header("User-Agent", self.ua.current())
            .send()
            .await;
        let rtt = started.elapsed().as_secs_f64();

        match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let outcome = ValidationOutcome {
                    accessible: status == 200,
                    status: Some(status),
                    content_type: header(&resp, "content-type"),
                    content_length: header(&resp, "content-length")
                        .and_then(|v| v.parse::<i64>().ok()),
                    final_url: Some(resp.url().to_string()),
                    redirect_count: redirects.load(Ordering::SeqCst),
                    error: None,
                };

                if let (Some(pool), Some(record)) = (&self.pool, &proxy) {
                    pool.mark_result(&record.endpoint, status == 200, Some(rtt), None)
                        .await;
                }

                let link_status = if outcome.accessible {
                    LinkStatus::Accessible
                } else {
                    LinkStatus::Broken
                };
                (outcome, link_status)
            }
            Err(e) => {
                let outcome = ValidationOutcome {
                    error: Some(e.to_string()),
                    ..Default::default()
                };

                let mut blocked = false;
                if let (Some(pool), Some(record)) = (&self.pool, &proxy) {
                    pool.mark_result(&record.endpoint, false, None, Some(&e.to_string()))
                        .await;
                    blocked = pool
                        .recent_failure_rate(&record.endpoint)
                        .await
                        .map(|rate| rate > BLOCKED_FAILURE_RATE)
                        .unwrap_or(true);
                }

                let link_status = if blocked {
                    LinkStatus::Blocked
                } else {
                    LinkStatus::Broken
                };
                (outcome, link_status)
            }
        }
    }
}

fn header(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
