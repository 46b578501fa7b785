use std::io::Write;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use juriscrape_core::types::{DiscoveryMode, PdfEvent};
use juriscrape_core::{AppConfig, CancelFlag};

use crate::scanner::DiscoveryScanner;

pub async fn run(
    config: AppConfig,
    resume: Option<String>,
    depth: Option<u32>,
    mode: Option<String>,
    output: Option<String>,
) -> Result<()> {
    let mode = mode
        .map(|m| m.parse::<DiscoveryMode>())
        .transpose()
        .context("invalid --mode")?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing current page and checkpointing");
                cancel.cancel();
            }
        });
    }

    let mut sink = match &output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot create {path}"))?;
            Some(std::io::BufWriter::new(file))
        }
        None => None,
    };

    let scanner = DiscoveryScanner::new(config, cancel);
    info!(session = scanner.session_id(), "discovery session created");
    let (tx, mut rx) = mpsc::channel::<PdfEvent>(256);

    let run_handle = tokio::spawn(scanner.run(resume, depth, mode, tx));

    let mut count: u64 = 0;
    while let Some(event) = rx.recv().await {
        count += 1;
        let accessible = event
            .validation
            .as_ref()
            .map(|v| if v.accessible { "ok" } else { "unreachable" })
            .unwrap_or("unvalidated");
        info!(
            url = %event.url,
            depth = event.depth,
            method = %event.method,
            accessible,
            "PDF discovered"
        );
        if let Some(sink) = sink.as_mut() {
            serde_json::to_writer(&mut *sink, &event)?;
            sink.write_all(b"\n")?;
        }
    }
    if let Some(mut sink) = sink {
        sink.flush()?;
    }

    let summary = run_handle.await??;
    println!();
    println!("Session {} {}", summary.session_id, summary.status);
    println!("  pages visited: {}", summary.counters.pages_visited);
    println!("  links found:   {}", summary.counters.links_found);
    println!("  new links:     {}", summary.counters.new_links);
    println!("  duplicates:    {}", summary.counters.duplicates);
    println!("  accessible:    {}", summary.counters.accessible);
    println!("  broken:        {}", summary.counters.broken);
    println!("  blocked:       {}", summary.counters.blocked);
    println!("  captchas:      {}", summary.counters.captchas);
    println!("  errors:        {}", summary.counters.errors);
    info!(emitted = count, "discover command done");
    Ok(())
}
