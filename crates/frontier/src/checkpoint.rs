use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use juriscrape_core::types::CrawlStats;
use juriscrape_core::CrawlError;

/// Snapshot of a crawl sufficient to resume it: visited set, pending
/// queue and counters. Written atomically (temp-then-rename) so the file
/// at rest is always either the previous checkpoint or the new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub visited: Vec<String>,
    /// `[url, depth, source_url, extraction_method]` per entry.
    pub queue: Vec<(String, u32, Option<String>, String)>,
    pub stats: CrawlStats,
    pub saved_at: String,
}

impl Checkpoint {
    pub fn path_for(session_dir: &Path, session_id: &str) -> PathBuf {
        session_dir.join(format!("crawler_state_{session_id}.json"))
    }

    pub fn save(&self, path: &Path) -> Result<(), CrawlError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CrawlError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| CrawlError::Storage(format!("serialize checkpoint: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)
            .map_err(|e| CrawlError::Storage(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| CrawlError::Storage(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CrawlError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CrawlError::Storage(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&data).map_err(|e| CrawlError::Parse(format!("checkpoint: {e}")))
    }

    pub fn stamp_now(mut self) -> Self {
        self.saved_at = Utc::now().to_rfc3339();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Checkpoint {
        Checkpoint {
            session_id: "session-1".to_string(),
            visited: vec![
                "https://site/a".to_string(),
                "https://site/b".to_string(),
            ],
            queue: vec![
                (
                    "https://site/c".to_string(),
                    2,
                    Some("https://site/a".to_string()),
                    "internal_link".to_string(),
                ),
                ("https://site/d.pdf".to_string(), 0, None, "sitemap".to_string()),
            ],
            stats: CrawlStats {
                pages_visited: 2,
                pdfs_found: 1,
                ..Default::default()
            },
            saved_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn save_load_save_is_identical_modulo_saved_at() {
        let dir = std::env::temp_dir().join(format!("juriscrape-ckpt-{}", std::process::id()));
        let first = Checkpoint::path_for(&dir, "a");
        let second = Checkpoint::path_for(&dir, "b");

        sample().save(&first).unwrap();
        let loaded = Checkpoint::load(&first).unwrap();
        loaded.save(&second).unwrap();

        let mut a: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        let mut b: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&second).unwrap()).unwrap();
        a["saved_at"] = serde_json::Value::Null;
        b["saved_at"] = serde_json::Value::Null;
        assert_eq!(a, b);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_temp_file_survives_a_save() {
        let dir = std::env::temp_dir().join(format!("juriscrape-ckpt-tmp-{}", std::process::id()));
        let path = Checkpoint::path_for(&dir, "x");
        sample().save(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
