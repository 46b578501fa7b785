use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use juriscrape_core::types::{LinkStatus, SessionStatus, ValidationOutcome};
use juriscrape_core::CrawlError;

/// A new row for the pdf_links table. `normalized_url` carries the
/// dedup identity; the unique index resolves concurrent inserts.
#[derive(Debug, Clone)]
pub struct NewPdfLink {
    pub url: String,
    pub normalized_url: String,
    pub source_url: String,
    pub session_id: String,
    pub extraction_method: String,
    pub confidence: f64,
    pub metadata: serde_json::Value,
}

/// Session counters mirrored into the discovery_sessions row.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounters {
    pub pages_visited: i64,
    pub links_found: i64,
    pub new_links: i64,
    pub duplicates: i64,
    pub errors: i64,
    pub accessible: i64,
    pub broken: i64,
    pub blocked: i64,
    pub captchas: i64,
}

/// One row of the session listing.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub mode: String,
    pub status: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub pages_visited: i64,
    pub new_links: i64,
    pub errors: i64,
}

/// One exported link row.
#[derive(Debug, Clone)]
pub struct LinkRow {
    pub url: String,
    pub normalized_url: String,
    pub source_url: Option<String>,
    pub status: String,
    pub http_status: Option<i64>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub discovered_at: String,
    pub extraction_method: String,
    pub confidence: f64,
}

/// Snapshot row for the proxy_health table, decoupled from the live
/// pool's record type.
#[derive(Debug, Clone)]
pub struct ProxyHealthRow {
    pub endpoint: String,
    pub source: String,
    pub protocol: String,
    pub host: String,
    pub port: i64,
    pub country: Option<String>,
    pub anonymity: Option<String>,
    pub https: bool,
    pub score: f64,
    pub total_requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    pub avg_response_time: Option<f64>,
    pub last_used: Option<String>,
    pub last_success: Option<String>,
    pub last_error: Option<String>,
    pub last_error_msg: Option<String>,
    pub is_healthy: bool,
    pub last_check: Option<String>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if needed) the SQLite store at `path`. One handle
    /// per process; writes are short-lived and committed immediately.
    pub async fn open(path: &str) -> Result<Self, CrawlError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| CrawlError::Storage(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        info!(path, "opened link store");
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> Result<Self, CrawlError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CrawlError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        debug!("migrations complete");
        Ok(())
    }

    // --- Sessions ---

    pub async fn create_session(
        &self,
        id: &str,
        mode: &str,
        max_depth: u32,
        config_json: &serde_json::Value,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO discovery_sessions (id, mode, max_depth, start_time, status, config_json)
             VALUES (?1, ?2, ?3, ?4, 'running', ?5)",
        )
        .bind(id)
        .bind(mode)
        .bind(max_depth as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(config_json.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn update_session_counters(
        &self,
        id: &str,
        counters: &SessionCounters,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            "UPDATE discovery_sessions
             SET pages_visited = ?2, links_found = ?3, new_links = ?4, duplicates = ?5,
                 errors = ?6, accessible = ?7, broken = ?8, blocked = ?9, captchas = ?10
             WHERE id = ?1",
        )
        .bind(id)
        .bind(counters.pages_visited)
        .bind(counters.links_found)
        .bind(counters.new_links)
        .bind(counters.duplicates)
        .bind(counters.errors)
        .bind(counters.accessible)
        .bind(counters.broken)
        .bind(counters.blocked)
        .bind(counters.captchas)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Set the terminal status. Guarded so it can only happen once:
    /// a session that already left `running` keeps its first outcome.
    pub async fn finish_session(
        &self,
        id: &str,
        status: SessionStatus,
        checkpoint_json: Option<&serde_json::Value>,
    ) -> Result<bool, CrawlError> {
        let result = sqlx::query(
            "UPDATE discovery_sessions
             SET status = ?2, end_time = ?3, checkpoint_json = COALESCE(?4, checkpoint_json)
             WHERE id = ?1 AND status = 'running'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(checkpoint_json.map(|v| v.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn session_status(&self, id: &str) -> Result<Option<String>, CrawlError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM discovery_sessions WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(row.map(|(s,)| s))
    }

    pub async fn list_sessions(&self, limit: i64) -> Result<Vec<SessionRow>, CrawlError> {
        let rows: Vec<(String, String, String, String, Option<String>, i64, i64, i64)> =
            sqlx::query_as(
                "SELECT id, mode, status, start_time, end_time, pages_visited, new_links, errors
                 FROM discovery_sessions
                 ORDER BY start_time DESC
                 LIMIT ?1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(
                |(id, mode, status, start_time, end_time, pages_visited, new_links, errors)| {
                    SessionRow {
                        id,
                        mode,
                        status,
                        start_time,
                        end_time,
                        pages_visited,
                        new_links,
                        errors,
                    }
                },
            )
            .collect())
    }

    // --- PDF links ---

    /// Insert a discovered link. Returns false when the normalized URL
    /// already exists (the unique index treats races as duplicates).
    pub async fn insert_pdf_link(&self, link: &NewPdfLink) -> Result<bool, CrawlError> {
        let result = sqlx::query(
            "INSERT INTO pdf_links
                 (url, normalized_url, source_url, discovery_session_id, discovered_at,
                  status, extraction_method, extraction_confidence, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, 'discovered', ?6, ?7, ?8)
             ON CONFLICT(normalized_url) DO NOTHING",
        )
        .bind(&link.url)
        .bind(&link.normalized_url)
        .bind(&link.source_url)
        .bind(&link.session_id)
        .bind(Utc::now().to_rfc3339())
        .bind(&link.extraction_method)
        .bind(link.confidence)
        .bind(link.metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a validation outcome in place; the row is never re-inserted.
    pub async fn update_validation(
        &self,
        normalized_url: &str,
        outcome: &ValidationOutcome,
        status: LinkStatus,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            "UPDATE pdf_links
             SET status = ?2, validated_at = ?3, http_status = ?4, content_type = ?5,
                 content_length = ?6, final_url = ?7, redirect_count = ?8
             WHERE normalized_url = ?1",
        )
        .bind(normalized_url)
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(outcome.status.map(|s| s as i64))
        .bind(&outcome.content_type)
        .bind(outcome.content_length)
        .bind(&outcome.final_url)
        .bind(outcome.redirect_count as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All stored original URLs, for the pattern generator.
    pub async fn load_pdf_urls(&self) -> Result<Vec<String>, CrawlError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT url FROM pdf_links")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    pub async fn count_pdf_links(&self) -> Result<i64, CrawlError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pdf_links")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(row.0)
    }

    pub async fn count_session_links_by_status(
        &self,
        session_id: &str,
    ) -> Result<Vec<(String, i64)>, CrawlError> {
        sqlx::query_as(
            "SELECT status, COUNT(*) FROM pdf_links
             WHERE discovery_session_id = ?1 GROUP BY status",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))
    }

    pub async fn count_links_by_status(&self) -> Result<Vec<(String, i64)>, CrawlError> {
        sqlx::query_as(
            "SELECT status, COUNT(*) FROM pdf_links GROUP BY status ORDER BY COUNT(*) DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))
    }

    pub async fn export_links(
        &self,
        status_filter: Option<&str>,
    ) -> Result<Vec<LinkRow>, CrawlError> {
        type Row = (
            String,
            String,
            Option<String>,
            String,
            Option<i64>,
            Option<String>,
            Option<i64>,
            String,
            String,
            f64,
        );
        let query = match status_filter {
            Some(_) => {
                "SELECT url, normalized_url, source_url, status, http_status, content_type,
                        content_length, discovered_at, extraction_method, extraction_confidence
                 FROM pdf_links WHERE status = ?1 ORDER BY discovered_at"
            }
            None => {
                "SELECT url, normalized_url, source_url, status, http_status, content_type,
                        content_length, discovered_at, extraction_method, extraction_confidence
                 FROM pdf_links ORDER BY discovered_at"
            }
        };
        let mut q = sqlx::query_as::<_, Row>(query);
        if let Some(status) = status_filter {
            q = q.bind(status);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(
                |(
                    url,
                    normalized_url,
                    source_url,
                    status,
                    http_status,
                    content_type,
                    content_length,
                    discovered_at,
                    extraction_method,
                    confidence,
                )| LinkRow {
                    url,
                    normalized_url,
                    source_url,
                    status,
                    http_status,
                    content_type,
                    content_length,
                    discovered_at,
                    extraction_method,
                    confidence,
                },
            )
            .collect())
    }

    // --- Proxy health snapshots ---

    pub async fn upsert_proxy_health(&self, rows: &[ProxyHealthRow]) -> Result<(), CrawlError> {
        for row in rows {
            sqlx::query(
                "INSERT INTO proxy_health
                     (endpoint, source, protocol, host, port, country, anonymity, https, score,
                      total_requests, successful_requests, failed_requests, avg_response_time,
                      last_used, last_success, last_error, last_error_msg, is_healthy, last_check)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                 ON CONFLICT(endpoint) DO UPDATE SET
                     score = excluded.score,
                     total_requests = excluded.total_requests,
                     successful_requests = excluded.successful_requests,
                     failed_requests = excluded.failed_requests,
                     avg_response_time = excluded.avg_response_time,
                     last_used = excluded.last_used,
                     last_success = excluded.last_success,
                     last_error = excluded.last_error,
                     last_error_msg = excluded.last_error_msg,
                     is_healthy = excluded.is_healthy,
                     last_check = excluded.last_check",
            )
            .bind(&row.endpoint)
            .bind(&row.source)
            .bind(&row.protocol)
            .bind(&row.host)
            .bind(row.port)
            .bind(&row.country)
            .bind(&row.anonymity)
            .bind(row.https)
            .bind(row.score)
            .bind(row.total_requests)
            .bind(row.successful_requests)
            .bind(row.failed_requests)
            .bind(row.avg_response_time)
            .bind(&row.last_used)
            .bind(&row.last_success)
            .bind(&row.last_error)
            .bind(&row.last_error_msg)
            .bind(row.is_healthy)
            .bind(&row.last_check)
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn proxy_health_summary(&self) -> Result<(i64, i64), CrawlError> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_healthy), 0) FROM proxy_health",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
        Ok(row)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Storage {
        let storage = Storage::open_in_memory().await.unwrap();
        storage.run_migrations().await.unwrap();
        storage
    }

    fn link(url: &str, normalized: &str) -> NewPdfLink {
        NewPdfLink {
            url: url.to_string(),
            normalized_url: normalized.to_string(),
            source_url: "https://site/page".to_string(),
            session_id: "session-1".to_string(),
            extraction_method: "css_pdf_selector".to_string(),
            confidence: 0.9,
            metadata: serde_json::json!({"depth": 1}),
        }
    }

    #[tokio::test]
    async fn duplicate_normalized_urls_insert_once() {
        let storage = store().await;
        assert!(storage
            .insert_pdf_link(&link("https://site/x.pdf?utm=1", "https://site/x.pdf"))
            .await
            .unwrap());
        assert!(!storage
            .insert_pdf_link(&link("https://site/x.pdf", "https://site/x.pdf"))
            .await
            .unwrap());
        assert_eq!(storage.count_pdf_links().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn validation_updates_in_place() {
        let storage = store().await;
        storage
            .insert_pdf_link(&link("https://site/x.pdf", "https://site/x.pdf"))
            .await
            .unwrap();

        let outcome = ValidationOutcome {
            accessible: true,
            status: Some(200),
            content_type: Some("application/pdf".to_string()),
            content_length: Some(12345),
            final_url: Some("https://site/x.pdf".to_string()),
            redirect_count: 0,
            error: None,
        };
        storage
            .update_validation("https://site/x.pdf", &outcome, LinkStatus::Accessible)
            .await
            .unwrap();

        let rows = storage.export_links(Some("accessible")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].http_status, Some(200));
        assert_eq!(rows[0].content_length, Some(12345));
        assert_eq!(storage.count_pdf_links().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn terminal_session_status_sticks() {
        let storage = store().await;
        storage
            .create_session("s1", "full", 0, &serde_json::json!({}))
            .await
            .unwrap();

        assert!(storage
            .finish_session("s1", SessionStatus::Interrupted, None)
            .await
            .unwrap());
        // A second terminal transition must not overwrite the first.
        assert!(!storage
            .finish_session("s1", SessionStatus::Completed, None)
            .await
            .unwrap());
        assert_eq!(
            storage.session_status("s1").await.unwrap().as_deref(),
            Some("interrupted")
        );
    }

    #[tokio::test]
    async fn session_counters_round_trip() {
        let storage = store().await;
        storage
            .create_session("s1", "deep", 3, &serde_json::json!({}))
            .await
            .unwrap();
        storage
            .update_session_counters(
                "s1",
                &SessionCounters {
                    pages_visited: 42,
                    new_links: 7,
                    errors: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let sessions = storage.list_sessions(10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].pages_visited, 42);
        assert_eq!(sessions[0].new_links, 7);
    }

    #[tokio::test]
    async fn proxy_health_snapshot_upserts() {
        let storage = store().await;
        let mut row = ProxyHealthRow {
            endpoint: "http://10.0.0.1:8080".to_string(),
            source: "test".to_string(),
            protocol: "http".to_string(),
            host: "10.0.0.1".to_string(),
            port: 8080,
            country: None,
            anonymity: None,
            https: false,
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
            last_check: None,
        };
        storage.upsert_proxy_health(&[row.clone()]).await.unwrap();
        row.score = 90.0;
        storage.upsert_proxy_health(&[row]).await.unwrap();

        let (total, healthy) = storage.proxy_health_summary().await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(healthy, 1);
    }
}
