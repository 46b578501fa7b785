use url::Url;

/// Produces the canonical identity form of a URL. This is the only place
/// in the workspace that decides URL identity: the frontier's visited set,
/// the store's unique index and every dedup pass all go through it.
///
/// Rules: scheme and host lowercased, default port dropped, path
/// percent-decoded and re-encoded, fragment removed, query dropped for
/// `.pdf` paths (except configured identity parameters) and key-sorted
/// otherwise, trailing `/index.html` collapsed to `/`.
#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    pdf_identity_params: Vec<String>,
}

impl UrlNormalizer {
    pub fn new(pdf_identity_params: Vec<String>) -> Self {
        Self { pdf_identity_params }
    }

    pub fn normalize(&self, raw: &str) -> String {
        let raw = raw.trim();
        let Ok(mut url) = Url::parse(raw) else {
            // Unparseable input has no better canonical form than itself.
            return raw.to_string();
        };

        url.set_fragment(None);

        // Canonical path: decode once, let Url re-encode what needs it.
        if let Ok(decoded) = urlencoding::decode(url.path()) {
            let decoded = decoded.into_owned();
            url.set_path(&decoded);
        }

        if url.path().ends_with("/index.html") {
            let collapsed = url.path().trim_end_matches("index.html").to_string();
            url.set_path(&collapsed);
        }

        let is_pdf = url.path().to_ascii_lowercase().ends_with(".pdf");
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if is_pdf {
            // PDFs are typically static; the query is usually tracking noise.
            // Keys listed as identity parameters survive (dynamically
            // generated documents keyed by e.g. ?id=).
            pairs.retain(|(k, _)| self.pdf_identity_params.iter().any(|p| p == k));
        }
        pairs.sort();

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                serializer.append_pair(k, v);
            }
            let query = serializer.finish();
            url.set_query(Some(&query));
        }

        url.to_string()
    }
}

/// Normalize with no identity parameters configured.
pub fn normalize_url(raw: &str) -> String {
    UrlNormalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host_only() {
        assert_eq!(
            normalize_url("HTTP://Example.COM/Docs/File.pdf"),
            "http://example.com/Docs/File.pdf"
        );
    }

    #[test]
    fn strips_default_port_and_fragment() {
        assert_eq!(
            normalize_url("https://example.com:443/a/b#section-2"),
            "https://example.com/a/b"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/a"),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn drops_query_for_pdf_urls() {
        assert_eq!(
            normalize_url("https://example.com/doc.pdf?utm_source=mail&session=9"),
            "https://example.com/doc.pdf"
        );
    }

    #[test]
    fn keeps_configured_identity_params_on_pdfs() {
        let n = UrlNormalizer::new(vec!["id".to_string()]);
        assert_eq!(
            n.normalize("https://example.com/doc.pdf?utm=x&id=42"),
            "https://example.com/doc.pdf?id=42"
        );
    }

    #[test]
    fn sorts_query_keys_for_pages() {
        assert_eq!(
            normalize_url("https://example.com/search?b=2&a=1"),
            "https://example.com/search?a=1&b=2"
        );
    }

    #[test]
    fn collapses_trailing_index_html() {
        assert_eq!(
            normalize_url("https://example.com/archive/index.html"),
            "https://example.com/archive/"
        );
    }

    #[test]
    fn decodes_and_reencodes_path() {
        assert_eq!(
            normalize_url("https://example.com/a%20b/file.pdf"),
            "https://example.com/a%20b/file.pdf"
        );
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "https://Example.com/a/index.html",
            "https://example.com/doc.pdf?x=1",
            "https://example.com/search?b=2&a=1#frag",
            "https://example.com/a%20b/c",
            "not a url at all",
        ];
        for input in inputs {
            let once = normalize_url(input);
            assert_eq!(normalize_url(&once), once, "input: {input}");
        }
    }
}
