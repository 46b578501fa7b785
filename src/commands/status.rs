use anyhow::Result;

use juriscrape_core::AppConfig;
use juriscrape_storage::Storage;

pub async fn run(config: AppConfig, limit: i64) -> Result<()> {
    let storage = Storage::open(&config.storage.database).await?;
    storage.run_migrations().await?;

    let sessions = storage.list_sessions(limit).await?;
    println!("Sessions ({}):", sessions.len());
    for s in &sessions {
        println!(
            "  {}  {:<11} {:<8} pages={:<6} new={:<6} errors={:<4} started {}",
            s.id, s.status, s.mode, s.pages_visited, s.new_links, s.errors, s.start_time
        );
    }

    let total = storage.count_pdf_links().await?;
    println!("\nPDF links: {total}");
    for (status, count) in storage.count_links_by_status().await? {
        println!("  {status:<12} {count}");
    }

    let (proxies, healthy) = storage.proxy_health_summary().await?;
    println!("\nProxy health snapshot: {healthy}/{proxies} healthy");

    storage.close().await;
    Ok(())
}
