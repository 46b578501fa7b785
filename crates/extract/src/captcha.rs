use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use juriscrape_core::config::CaptchaConfig;
use juriscrape_core::page::Page;

/// Body substrings that mark a challenge page. Checked lower-cased, in
/// order, so the reported reason is the first match.
const CAPTCHA_PATTERNS: &[&str] = &[
    "captcha",
    "recaptcha",
    "hcaptcha",
    "verify you are human",
    "prove you are not a robot",
    "please complete the security check",
    "access denied",
    "too many requests",
    "rate limit exceeded",
    "cloudflare",
    "ddos protection",
    "security check",
    "are you human",
    // Spanish variants seen on judicial portals
    "comprueba que eres humano",
    "verificación de seguridad",
    "completa el desafío",
    "acceso denegado",
    "demasiadas solicitudes",
    "límite de tasa excedido",
];

const CAPTCHA_SELECTORS: &[&str] = &[
    "iframe[src*='recaptcha']",
    "iframe[src*='hcaptcha']",
    ".g-recaptcha",
    ".h-captcha",
    ".captcha",
    "[data-captcha]",
];

const TITLE_PATTERNS: &[&str] = &["captcha", "security check", "verification"];

/// What the policy decided about a challenged page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaAction {
    /// Re-inspect the page and carry on if the challenge cleared.
    Continue,
    /// Drop the page; the URL stays unvisited so a later session retries.
    Skip,
    /// Unwind the whole session as interrupted.
    Abort,
}

/// Classifies pages as challenged and applies the configured policy:
/// fail-safe pauses, or an interactive prompt for manual solving.
pub struct CaptchaDetector {
    alerts_dir: PathBuf,
    pause_on_captcha: bool,
    pause_seconds: u64,
    screenshot_on_captcha: bool,
    manual_solve_timeout: u64,
}

impl CaptchaDetector {
    pub fn new(config: &CaptchaConfig) -> Self {
        Self {
            alerts_dir: PathBuf::from(&config.alerts_dir),
            pause_on_captcha: config.pause_on_captcha,
            pause_seconds: config.pause_seconds,
            screenshot_on_captcha: config.screenshot_on_captcha,
            manual_solve_timeout: config.manual_solve_timeout,
        }
    }

    /// Returns the reason when the page looks like a challenge.
    pub async fn check(&self, page: &dyn Page) -> Option<String> {
        match page.content().await {
            Ok(content) => {
                let content = content.to_lowercase();
                for pattern in CAPTCHA_PATTERNS {
                    if content.contains(pattern) {
                        let reason = format!("Pattern match: {pattern}");
                        warn!(url = %page.url(), "CAPTCHA detected: {reason}");
                        return Some(reason);
                    }
                }
            }
            Err(e) => debug!("captcha content check failed: {e}"),
        }

        for selector in CAPTCHA_SELECTORS {
            match page.query_selector_all(selector).await {
                Ok(elements) if !elements.is_empty() => {
                    let reason = format!("Element found: {selector}");
                    warn!(url = %page.url(), "CAPTCHA detected: {reason}");
                    return Some(reason);
                }
                Ok(_) => {}
                Err(e) => debug!("captcha selector check failed: {e}"),
            }
        }

        match page.title().await {
            Ok(title) => {
                let title = title.to_lowercase();
                for pattern in TITLE_PATTERNS {
                    if title.contains(pattern) {
                        let reason = format!("Title contains: {pattern}");
                        warn!(url = %page.url(), "CAPTCHA detected: {reason}");
                        return Some(reason);
                    }
                }
            }
            Err(e) => debug!("captcha title check failed: {e}"),
        }

        None
    }

    /// Record the challenge (alert sidecar plus optional screenshot) and
    /// resolve the configured policy.
    pub async fn resolve(&self, page: &dyn Page, session_id: &str, reason: &str) -> CaptchaAction {
        let url = page.url();
        error!(session = session_id, url = %url, reason, "CAPTCHA blocking access");

        let screenshot_path = if self.screenshot_on_captcha {
            let path = self
                .alerts_dir
                .join(format!("captcha_{session_id}_{}.png", Utc::now().timestamp()));
            match page.screenshot(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "CAPTCHA screenshot saved");
                    Some(path)
                }
                Err(e) => {
                    error!("failed to take CAPTCHA screenshot: {e}");
                    None
                }
            }
        } else {
            None
        };

        self.write_alert(session_id, &url, reason, screenshot_path.as_deref());

        if !self.pause_on_captcha {
            warn!(session = session_id, "continuing past CAPTCHA after short pause");
            tokio::time::sleep(Duration::from_secs(5)).await;
            return CaptchaAction::Continue;
        }

        if self.pause_seconds > 0 {
            info!(
                session = session_id,
                seconds = self.pause_seconds,
                "pausing for CAPTCHA cool-down"
            );
            tokio::time::sleep(Duration::from_secs(self.pause_seconds)).await;
            return CaptchaAction::Continue;
        }

        self.prompt_operator(session_id, &url).await
    }

    async fn prompt_operator(&self, session_id: &str, url: &str) -> CaptchaAction {
        println!("\n{}", "=".repeat(78));
        println!("CAPTCHA detected at {url}");
        println!("Solve it in the browser, then answer below.");
        println!("  [enter]  continue");
        println!("  skip     skip this URL");
        println!("  abort    abort the session");
        println!("{}\n", "=".repeat(78));

        let input = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        });

        let answer =
            match tokio::time::timeout(Duration::from_secs(self.manual_solve_timeout), input).await
            {
                Ok(Ok(Ok(line))) => line.trim().to_lowercase(),
                Ok(_) => {
                    error!("failed to read operator input, continuing");
                    String::new()
                }
                Err(_) => {
                    warn!(
                        timeout = self.manual_solve_timeout,
                        "no operator answer before timeout, continuing"
                    );
                    String::new()
                }
            };

        match answer.as_str() {
            "skip" => {
                info!(session = session_id, "skipping URL due to CAPTCHA");
                CaptchaAction::Skip
            }
            "abort" => {
                warn!(session = session_id, "aborting session due to CAPTCHA");
                CaptchaAction::Abort
            }
            _ => {
                info!(session = session_id, "continuing after manual resolution");
                CaptchaAction::Continue
            }
        }
    }

    fn write_alert(
        &self,
        session_id: &str,
        url: &str,
        reason: &str,
        screenshot: Option<&std::path::Path>,
    ) {
        if let Err(e) = std::fs::create_dir_all(&self.alerts_dir) {
            error!("failed to create alerts dir: {e}");
            return;
        }
        let path = self.alerts_dir.join(format!("alert_{session_id}.txt"));
        let result = std::fs::File::create(&path).and_then(|mut f| {
            writeln!(f, "CAPTCHA detected at {}", Utc::now().to_rfc3339())?;
            writeln!(f, "URL: {url}")?;
            writeln!(f, "Reason: {reason}")?;
            writeln!(
                f,
                "Screenshot: {}",
                screenshot.map(|p| p.display().to_string()).unwrap_or_else(|| "not taken".into())
            )?;
            writeln!(f, "Session: {session_id}")
        });
        if let Err(e) = result {
            error!("failed to write CAPTCHA alert file: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_page::MockPage;

    fn detector(pause_on_captcha: bool, pause_seconds: u64) -> CaptchaDetector {
        CaptchaDetector::new(&CaptchaConfig {
            auto_detect: true,
            pause_on_captcha,
            pause_seconds,
            screenshot_on_captcha: false,
            manual_solve_timeout: 300,
            alerts_dir: std::env::temp_dir()
                .join("juriscrape-captcha-tests")
                .to_string_lossy()
                .into_owned(),
        })
    }

    #[tokio::test]
    async fn spanish_pattern_is_reported_verbatim() {
        let page = MockPage::new(
            "https://site/page",
            "<html><body><p>Verificación de seguridad requerida</p></body></html>",
        );
        let reason = detector(true, 1).check(&page).await;
        assert_eq!(
            reason.as_deref(),
            Some("Pattern match: verificación de seguridad")
        );
    }

    #[tokio::test]
    async fn dom_selector_hit_is_detected() {
        let page = MockPage::new(
            "https://site/page",
            r#"<html><body><div class="g-recaptcha" data-sitekey="k"></div></body></html>"#,
        );
        let reason = detector(true, 1).check(&page).await.unwrap();
        // The g-recaptcha class also trips the body pattern scan first.
        assert!(reason.starts_with("Pattern match:") || reason.starts_with("Element found:"));
    }

    #[tokio::test]
    async fn title_only_challenge_is_detected() {
        let page = MockPage::new(
            "https://site/page",
            "<html><head><title>Identity Verification</title></head><body><p>hold on</p></body></html>",
        );
        let reason = detector(true, 1).check(&page).await;
        assert_eq!(reason.as_deref(), Some("Title contains: verification"));
    }

    #[tokio::test]
    async fn clean_page_passes() {
        let page = MockPage::new(
            "https://site/page",
            "<html><body><a href='/doc.pdf'>judgment</a></body></html>",
        );
        assert!(detector(true, 1).check(&page).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_pause_sleeps_then_continues() {
        let page = MockPage::new("https://site/page", "<html><body>captcha</body></html>");
        let detector = detector(true, 2);
        let start = tokio::time::Instant::now();
        let action = detector.resolve(&page, "session-1", "Pattern match: captcha").await;
        assert_eq!(action, CaptchaAction::Continue);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_pause_still_cools_down_briefly() {
        let page = MockPage::new("https://site/page", "<html><body>captcha</body></html>");
        let detector = detector(false, 0);
        let start = tokio::time::Instant::now();
        let action = detector.resolve(&page, "session-1", "Pattern match: captcha").await;
        assert_eq!(action, CaptchaAction::Continue);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
