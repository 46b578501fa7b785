use std::collections::HashSet;

use tracing::debug;
use url::Url;

use juriscrape_core::page::Page;
use juriscrape_core::types::{DiscoveredPdf, ExtractionMethod};
use juriscrape_core::UrlNormalizer;

use crate::html::PDF_URL_RE;

const MAX_ANCHORS_SCANNED: usize = 200;
const MAX_LINKS_PER_PAGE: usize = 100;

const SKIPPED_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".zip", ".doc", ".docx",
];

/// Pulls PDF candidates and internal navigation links out of a live page.
///
/// Three methods run in order — CSS anchors, a regex over the full HTML,
/// the same regex over every script body — and their union is
/// deduplicated by normalized URL. Ordering makes the dedup keep the
/// highest-confidence hit.
pub struct LinkExtractor {
    normalizer: UrlNormalizer,
}

impl LinkExtractor {
    pub fn new(normalizer: UrlNormalizer) -> Self {
        Self { normalizer }
    }

    pub async fn extract_pdfs(
        &self,
        page: &dyn Page,
        source_url: &str,
        depth: u32,
    ) -> Vec<DiscoveredPdf> {
        let mut found: Vec<DiscoveredPdf> = Vec::new();
        let base = Url::parse(source_url).ok();

        // Method 1: anchors whose href ends in .pdf
        match page.query_selector_all("a[href$='.pdf']").await {
            Ok(elements) => {
                for el in elements {
                    let Some(href) = el.attribute("href") else {
                        continue;
                    };
                    let resolved = match &base {
                        Some(base) => match base.join(href) {
                            Ok(u) => u.to_string(),
                            Err(_) => continue,
                        },
                        None => href.to_string(),
                    };
                    found.push(DiscoveredPdf {
                        url: resolved,
                        source_url: source_url.to_string(),
                        depth,
                        method: ExtractionMethod::CssPdfSelector,
                        confidence: 0.9,
                    });
                }
            }
            Err(e) => debug!("css pdf extraction failed: {e}"),
        }

        // Method 2: regex over the whole document
        match page.content().await {
            Ok(html) => {
                for m in PDF_URL_RE.find_iter(&html) {
                    found.push(DiscoveredPdf {
                        url: m.as_str().to_string(),
                        source_url: source_url.to_string(),
                        depth,
                        method: ExtractionMethod::RegexFallback,
                        confidence: 0.7,
                    });
                }
            }
            Err(e) => debug!("regex pdf extraction failed: {e}"),
        }

        // Method 3: the same regex over embedded script text
        match page.query_selector_all("script").await {
            Ok(scripts) => {
                for script in scripts {
                    for m in PDF_URL_RE.find_iter(script.text_content()) {
                        found.push(DiscoveredPdf {
                            url: m.as_str().to_string(),
                            source_url: source_url.to_string(),
                            depth,
                            method: ExtractionMethod::ScriptScan,
                            confidence: 0.6,
                        });
                    }
                }
            }
            Err(e) => debug!("script scan extraction failed: {e}"),
        }

        let mut seen = HashSet::with_capacity(found.len());
        found.retain(|pdf| seen.insert(self.normalizer.normalize(&pdf.url)));
        found
    }

    /// Same-host navigation links for the BFS, capped to keep one hub
    /// page from exploding the frontier.
    pub async fn extract_internal_links(&self, page: &dyn Page, base_url: &str) -> Vec<String> {
        let Ok(base) = Url::parse(base_url) else {
            return Vec::new();
        };

        let anchors = match page.query_selector_all("a[href]").await {
            Ok(anchors) => anchors,
            Err(e) => {
                debug!("internal link extraction failed: {e}");
                return Vec::new();
            }
        };

        let mut links = Vec::new();
        for el in anchors.iter().take(MAX_ANCHORS_SCANNED) {
            let Some(href) = el.attribute("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("data:")
            {
                continue;
            }

            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if resolved.fragment().is_some() {
                continue;
            }
            if resolved.host_str() != base.host_str() {
                continue;
            }
            let path = resolved.path().to_ascii_lowercase();
            if SKIPPED_EXTENSIONS.iter().any(|ext| path.contains(ext)) {
                continue;
            }

            links.push(resolved.to_string());
            if links.len() >= MAX_LINKS_PER_PAGE {
                break;
            }
        }

        debug!(count = links.len(), url = %base_url, "internal links found");
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_page::MockPage;
    use juriscrape_core::normalize::normalize_url;

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(UrlNormalizer::default())
    }

    #[tokio::test]
    async fn anchor_and_script_duplicates_keep_css_hit() {
        let page = MockPage::new(
            "https://site/page",
            r#"<html><body>
                <a href="/x.pdf">judgment</a>
                <script>var u = "https://site/x.pdf";</script>
            </body></html>"#,
        );

        let pdfs = extractor().extract_pdfs(&page, "https://site/page", 1).await;
        assert_eq!(pdfs.len(), 1);
        assert_eq!(pdfs[0].method, ExtractionMethod::CssPdfSelector);
        assert_eq!(pdfs[0].confidence, 0.9);
        assert_eq!(normalize_url(&pdfs[0].url), "https://site/x.pdf");
    }

    #[tokio::test]
    async fn script_only_urls_fall_through_to_script_scan() {
        let page = MockPage::new(
            "https://site/page",
            r#"<html><body>
                <script>load("https://site/docs/only-in-js.pdf");</script>
            </body></html>"#,
        );

        let pdfs = extractor().extract_pdfs(&page, "https://site/page", 0).await;
        // The document regex sees script text too, so the regex method
        // claims it before the dedicated script scan.
        assert_eq!(pdfs.len(), 1);
        assert_eq!(pdfs[0].method, ExtractionMethod::RegexFallback);
        assert_eq!(pdfs[0].confidence, 0.7);
    }

    #[tokio::test]
    async fn output_is_stable_across_runs() {
        let html = r#"<html><body>
            <a href="/a.pdf">a</a>
            <a href="/b.pdf">b</a>
            <script>var x = "https://site/c.pdf";</script>
        </body></html>"#;
        let page = MockPage::new("https://site/", html);
        let first = extractor().extract_pdfs(&page, "https://site/", 0).await;
        let second = extractor().extract_pdfs(&page, "https://site/", 0).await;
        let urls = |pdfs: &[DiscoveredPdf]| pdfs.iter().map(|p| p.url.clone()).collect::<Vec<_>>();
        assert_eq!(urls(&first), urls(&second));
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn internal_links_filter_external_binary_and_scheme_noise() {
        let page = MockPage::new(
            "https://site/section/",
            r##"<html><body>
                <a href="/section/page2">next</a>
                <a href="https://other.example/page">external</a>
                <a href="mailto:court@example.org">mail</a>
                <a href="javascript:void(0)">js</a>
                <a href="/photo.jpg">img</a>
                <a href="/doc.pdf">pdf</a>
                <a href="#anchor">frag</a>
            </body></html>"##,
        );

        let links = extractor()
            .extract_internal_links(&page, "https://site/section/")
            .await;
        assert_eq!(links, vec!["https://site/section/page2".to_string()]);
    }

    #[tokio::test]
    async fn per_page_link_cap_holds() {
        let mut body = String::from("<html><body>");
        for i in 0..300 {
            body.push_str(&format!("<a href=\"/p/{i}\">p{i}</a>"));
        }
        body.push_str("</body></html>");
        let page = MockPage::new("https://site/", &body);

        let links = extractor().extract_internal_links(&page, "https://site/").await;
        assert_eq!(links.len(), MAX_LINKS_PER_PAGE);
    }
}
