use anyhow::Result;

use juriscrape_core::AppConfig;
use juriscrape_net::ProxyPool;

pub async fn run(config: AppConfig, refresh: bool) -> Result<()> {
    let pool = ProxyPool::new(config.proxy.clone())?;

    if refresh {
        pool.refresh().await?;
    } else {
        pool.initialize().await?;
    }

    let stats = pool.stats().await;
    println!("Proxy pool: {} total, {} healthy, {} scoring 70+", stats.total, stats.healthy, stats.high_score);
    if let Some(last) = stats.last_refresh {
        println!("Last refresh: {last}");
    }

    let mut records = pool.snapshot().await;
    records.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    println!("\nTop proxies:");
    for record in records.iter().take(20) {
        println!(
            "  {:<30} score={:>5.1} ok={}/{} rtt={}",
            record.endpoint,
            record.score,
            record.successful_requests,
            record.total_requests,
            record
                .avg_response_time
                .map(|r| format!("{r:.2}s"))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}
