use std::io::Write;

use anyhow::{bail, Context, Result};

use juriscrape_core::AppConfig;
use juriscrape_storage::{LinkRow, Storage};

pub async fn run(
    config: AppConfig,
    format: &str,
    output: Option<String>,
    status: Option<String>,
) -> Result<()> {
    let storage = Storage::open(&config.storage.database).await?;
    storage.run_migrations().await?;
    let rows = storage.export_links(status.as_deref()).await?;
    storage.close().await;

    let rendered = match format {
        "json" => render_json(&rows)?,
        "csv" => render_csv(&rows),
        "txt" => render_txt(&rows),
        other => bail!("unknown export format: {other}"),
    };

    match output {
        Some(path) => {
            let mut file = std::fs::File::create(&path)
                .with_context(|| format!("cannot create {path}"))?;
            file.write_all(rendered.as_bytes())?;
            eprintln!("{} links exported to {path}", rows.len());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn render_json(rows: &[LinkRow]) -> Result<String> {
    let values: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            serde_json::json!({
                "url": r.url,
                "normalized_url": r.normalized_url,
                "source_url": r.source_url,
                "status": r.status,
                "http_status": r.http_status,
                "content_type": r.content_type,
                "content_length": r.content_length,
                "discovered_at": r.discovered_at,
                "extraction_method": r.extraction_method,
                "confidence": r.confidence,
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&values)? + "\n")
}

fn render_csv(rows: &[LinkRow]) -> String {
    let escape = |field: &str| {
        if field.contains([',', '"', '\n']) {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    };
    let mut out =
        String::from("url,status,http_status,content_type,content_length,discovered_at,method\n");
    for r in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            escape(&r.url),
            r.status,
            r.http_status.map(|s| s.to_string()).unwrap_or_default(),
            escape(r.content_type.as_deref().unwrap_or("")),
            r.content_length.map(|l| l.to_string()).unwrap_or_default(),
            r.discovered_at,
            r.extraction_method,
        ));
    }
    out
}

fn render_txt(rows: &[LinkRow]) -> String {
    let mut out = String::new();
    for r in rows {
        out.push_str(&r.url);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str) -> LinkRow {
        LinkRow {
            url: url.to_string(),
            normalized_url: url.to_string(),
            source_url: None,
            status: "discovered".to_string(),
            http_status: None,
            content_type: Some("application/pdf".to_string()),
            content_length: Some(10),
            discovered_at: "2026-01-01T00:00:00+00:00".to_string(),
            extraction_method: "sitemap".to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn csv_escapes_commas_and_quotes() {
        let rendered = render_csv(&[row("https://site/a,b\"c.pdf")]);
        assert!(rendered.contains("\"https://site/a,b\"\"c.pdf\""));
    }

    #[test]
    fn txt_is_one_url_per_line() {
        let rendered = render_txt(&[row("https://site/a.pdf"), row("https://site/b.pdf")]);
        assert_eq!(rendered, "https://site/a.pdf\nhttps://site/b.pdf\n");
    }
}
