use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Any absolute URL ending in `.pdf`, as it appears in HTML, JSON or
/// inline script text.
pub static PDF_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s"'<>]+\.pdf"#).unwrap());

static HREF_PDF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)href="([^"]+\.pdf)""#).unwrap());

/// Absolute PDF URLs found anywhere in a blob of HTML/JS.
pub fn find_pdf_urls(html: &str) -> Vec<String> {
    PDF_URL_RE
        .find_iter(html)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Absolute plus base-resolved relative PDF URLs, first-seen deduplicated.
pub fn find_pdf_urls_with_base(html: &str, base: &Url) -> Vec<String> {
    let mut urls = find_pdf_urls(html);
    for cap in HREF_PDF_RE.captures_iter(html) {
        if let Ok(resolved) = base.join(&cap[1]) {
            urls.push(resolved.to_string());
        }
    }

    let mut seen = std::collections::HashSet::with_capacity(urls.len());
    urls.retain(|u| seen.insert(u.clone()));
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_absolute_pdf_urls_in_markup_and_scripts() {
        let html = r#"
            <a href="https://example.com/a.pdf">a</a>
            <script>var doc = "https://example.com/b.PDF";</script>
        "#;
        let urls = find_pdf_urls(html);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://example.com/a.pdf");
        assert_eq!(urls[1], "https://example.com/b.PDF");
    }

    #[test]
    fn resolves_relative_hrefs_against_base() {
        let base = Url::parse("https://example.com/results/page1").unwrap();
        let html = r#"<a href="/docs/doc_01.pdf">doc</a> <a href="doc_02.pdf">doc</a>"#;
        let urls = find_pdf_urls_with_base(html, &base);
        assert!(urls.contains(&"https://example.com/docs/doc_01.pdf".to_string()));
        assert!(urls.contains(&"https://example.com/results/doc_02.pdf".to_string()));
    }

    #[test]
    fn dedups_absolute_and_href_duplicates() {
        let base = Url::parse("https://example.com/").unwrap();
        let html = r#"<a href="https://example.com/x.pdf">x</a>"#;
        let urls = find_pdf_urls_with_base(html, &base);
        assert_eq!(urls.len(), 1);
    }
}
