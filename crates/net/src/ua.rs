use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::seq::SliceRandom;
use tracing::{info, warn};

use juriscrape_core::config::UserAgentConfig;

const FALLBACK_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Rotating identity strings. Loaded from a one-per-line file with `#`
/// comments; falls back to a small built-in set when the file is missing.
pub struct UserAgentPool {
    agents: Vec<String>,
    round_robin: AtomicUsize,
    session_ua: Mutex<Option<String>>,
    rotate_per_request: bool,
}

impl UserAgentPool {
    pub fn load(config: &UserAgentConfig) -> Self {
        let path = Path::new(&config.pool_file);
        let agents = match std::fs::read_to_string(path) {
            Ok(content) => {
                let agents: Vec<String> = content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect();
                info!(count = agents.len(), file = %path.display(), "loaded user agents");
                agents
            }
            Err(_) => {
                warn!(file = %path.display(), "user agent file not found, using built-in set");
                Vec::new()
            }
        };
        let agents = if agents.is_empty() {
            FALLBACK_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            agents
        };

        let pool = Self {
            agents,
            round_robin: AtomicUsize::new(0),
            session_ua: Mutex::new(None),
            rotate_per_request: config.rotate_per_request,
        };
        if config.rotate_per_session {
            pool.pin_session_ua();
        }
        pool
    }

    pub fn random(&self) -> String {
        self.agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| FALLBACK_AGENTS[0].to_string())
    }

    pub fn next(&self) -> String {
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed);
        self.agents[idx % self.agents.len()].clone()
    }

    /// Pin one agent for the whole session.
    pub fn pin_session_ua(&self) -> String {
        let ua = self.random();
        *self.session_ua.lock().unwrap() = Some(ua.clone());
        info!(ua = %ua, "session user agent pinned");
        ua
    }

    /// What the next request should send: a fresh agent when per-request
    /// rotation is on, the pinned session agent when one exists, a random
    /// one otherwise.
    pub fn current(&self) -> String {
        if self.rotate_per_request {
            return self.random();
        }
        if let Some(ua) = self.session_ua.lock().unwrap().clone() {
            return ua;
        }
        self.random()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(rotate_per_session: bool, rotate_per_request: bool) -> UserAgentPool {
        UserAgentPool::load(&UserAgentConfig {
            pool_file: "/nonexistent/user_agents.txt".to_string(),
            rotate_per_session,
            rotate_per_request,
        })
    }

    #[test]
    fn missing_file_falls_back_to_builtin_agents() {
        let pool = pool(false, false);
        assert_eq!(pool.len(), FALLBACK_AGENTS.len());
    }

    #[test]
    fn round_robin_wraps() {
        let pool = pool(false, false);
        let first = pool.next();
        for _ in 1..pool.len() {
            pool.next();
        }
        assert_eq!(pool.next(), first);
    }

    #[test]
    fn session_pinning_is_stable() {
        let pool = pool(true, false);
        let a = pool.current();
        let b = pool.current();
        assert_eq!(a, b);
    }
}
