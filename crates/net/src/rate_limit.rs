use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use juriscrape_core::config::RateLimitingConfig;

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub current_rate_req_min: f64,
    pub base_rate_req_min: f64,
    pub tokens_available: f64,
    pub burst_size: u32,
    pub total_requests: u64,
    pub count_429: u64,
    pub current_backoff_seconds: u64,
}

struct LimiterState {
    current_rate: f64,
    tokens: f64,
    last_refill: Instant,
    backoff_until: Instant,
    total_requests: u64,
    count_429: u64,
    current_backoff: u64,
}

impl LimiterState {
    fn refill(&mut self, burst_size: f64) {
        let now = Instant::now();
        // Tokens only accrue after the backoff window has passed.
        let accrue_from = self.last_refill.max(self.backoff_until);
        let elapsed = now.saturating_duration_since(accrue_from).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.current_rate / 60.0).min(burst_size);
        self.last_refill = now;
    }

    fn next_wait(&self) -> Duration {
        let now = Instant::now();
        let backoff_remaining = self.backoff_until.saturating_duration_since(now);
        let needed = (1.0 - self.tokens).max(0.0);
        let refill_secs = needed / (self.current_rate / 60.0);
        backoff_remaining + Duration::from_secs_f64(refill_secs.max(0.01))
    }
}

/// Token bucket that adapts to the server: halves its rate on every 429
/// and creeps back toward the base rate on success. All state lives
/// behind one mutex; at most one acquirer proceeds per token.
pub struct AdaptiveRateLimiter {
    base_rate: f64,
    burst_size: u32,
    backoff_on_429: bool,
    max_backoff: u64,
    state: Mutex<LimiterState>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: &RateLimitingConfig) -> Self {
        let base_rate = f64::from(config.requests_per_minute.max(1));
        Self {
            base_rate,
            burst_size: config.burst_size.max(1),
            backoff_on_429: config.backoff_on_429,
            max_backoff: config.max_backoff_seconds,
            state: Mutex::new(LimiterState {
                current_rate: base_rate,
                tokens: f64::from(config.burst_size.max(1)),
                last_refill: Instant::now(),
                backoff_until: Instant::now(),
                total_requests: 0,
                count_429: 0,
                current_backoff: 0,
            }),
        }
    }

    /// Suspend until one token is available, then take it. Callers invoke
    /// this immediately before every outgoing request.
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;
        loop {
            state.refill(f64::from(self.burst_size));
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                state.total_requests += 1;
                return;
            }

            let wait = state.next_wait();
            let jitter: f64 = rand::thread_rng().gen_range(-0.1..0.1);
            let wait = wait.mul_f64((1.0 + jitter).max(0.01));
            debug!(wait_secs = wait.as_secs_f64(), "rate limit active");
            // The lock is held across the sleep so no other acquirer can
            // slip past this waiter.
            tokio::time::sleep(wait).await;
        }
    }

    /// Halve the rate and open a backoff window sized by how many 429s
    /// this session has seen.
    pub async fn on_429(&self) {
        if !self.backoff_on_429 {
            return;
        }
        let mut state = self.state.lock().await;
        state.count_429 += 1;
        let old_rate = state.current_rate;
        state.current_rate = (state.current_rate * 0.5).max(1.0);

        let backoff = (state.count_429.pow(2) * 10).min(self.max_backoff);
        state.current_backoff = backoff;
        state.tokens = 0.0;
        state.backoff_until = Instant::now() + Duration::from_secs(backoff);

        warn!(
            old_rate,
            new_rate = state.current_rate,
            backoff_secs = backoff,
            "429 received, backing off"
        );
    }

    /// Recover 10% of the rate per successful request, up to the base.
    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        if state.current_rate < self.base_rate {
            state.current_rate = (state.current_rate * 1.1).min(self.base_rate);
            info!(rate = state.current_rate, "rate recovered after success");
        }
    }

    pub async fn current_rate(&self) -> f64 {
        self.state.lock().await.current_rate
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock().await;
        RateLimiterStats {
            current_rate_req_min: state.current_rate,
            base_rate_req_min: self.base_rate,
            tokens_available: state.tokens,
            burst_size: self.burst_size,
            total_requests: state.total_requests,
            count_429: state.count_429,
            current_backoff_seconds: state.current_backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests_per_minute: u32, burst_size: u32) -> AdaptiveRateLimiter {
        AdaptiveRateLimiter::new(&RateLimitingConfig {
            requests_per_minute,
            burst_size,
            backoff_on_429: true,
            max_backoff_seconds: 300,
        })
    }

    #[tokio::test]
    async fn rate_halves_per_429_and_recovers_by_ten_percent() {
        let limiter = limiter(60, 5);
        limiter.on_429().await;
        assert_eq!(limiter.current_rate().await, 30.0);

        limiter.on_429().await;
        limiter.on_429().await;
        assert_eq!(limiter.current_rate().await, 7.5);

        for _ in 0..10 {
            limiter.on_success().await;
        }
        let rate = limiter.current_rate().await;
        assert!((rate - 7.5 * 1.1f64.powi(10)).abs() < 1e-6, "rate = {rate}");
        assert!((rate - 19.45).abs() < 0.01);
    }

    #[tokio::test]
    async fn rate_stays_within_one_and_base() {
        let limiter = limiter(20, 5);
        for _ in 0..50 {
            limiter.on_429().await;
        }
        assert_eq!(limiter.current_rate().await, 1.0);

        for _ in 0..200 {
            limiter.on_success().await;
        }
        assert_eq!(limiter.current_rate().await, 20.0);
        limiter.on_success().await;
        assert_eq!(limiter.current_rate().await, 20.0);
    }

    #[tokio::test]
    async fn backoff_caps_at_configured_maximum() {
        let limiter = AdaptiveRateLimiter::new(&RateLimitingConfig {
            requests_per_minute: 60,
            burst_size: 5,
            backoff_on_429: true,
            max_backoff_seconds: 60,
        });
        for _ in 0..10 {
            limiter.on_429().await;
        }
        assert_eq!(limiter.stats().await.current_backoff_seconds, 60);
    }

    #[tokio::test]
    async fn disabled_backoff_ignores_429() {
        let limiter = AdaptiveRateLimiter::new(&RateLimitingConfig {
            requests_per_minute: 60,
            burst_size: 5,
            backoff_on_429: false,
            max_backoff_seconds: 300,
        });
        limiter.on_429().await;
        assert_eq!(limiter.current_rate().await, 60.0);
        assert_eq!(limiter.stats().await.count_429, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_instant_then_waits_for_refill() {
        let limiter = limiter(60, 5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        // Sixth token refills at 1/s (±10% jitter).
        limiter.wait().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(890), "elapsed = {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1200), "elapsed = {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_window_delays_next_token() {
        let limiter = limiter(60, 5);
        limiter.on_429().await;
        let start = Instant::now();
        limiter.wait().await;
        // 10s backoff plus ~2s refill at the halved rate of 30/min.
        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
