mod cli;
mod commands;
mod crawl;
mod scanner;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// glibc malloc holds on to memory under churny allocation patterns;
// mimalloc keeps the long-running crawl lean.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use juriscrape_core::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;
    apply_env_overrides(&mut config);

    match cli.command {
        Commands::Discover {
            resume,
            depth,
            mode,
            output,
        } => {
            commands::discover::run(config, resume, depth, mode, output).await?;
        }
        Commands::Status { limit } => {
            commands::status::run(config, limit).await?;
        }
        Commands::Export {
            format,
            output,
            status,
        } => {
            commands::export::run(config, &format, output, status).await?;
        }
        Commands::Proxies { refresh } => {
            commands::proxies::run(config, refresh).await?;
        }
    }

    Ok(())
}

/// Targeted environment overrides for the knobs that change per run.
fn apply_env_overrides(config: &mut AppConfig) {
    let truthy = |v: &str| v != "0" && !v.eq_ignore_ascii_case("false");

    if let Ok(v) = std::env::var("JURISCRAPE_MAX_DEPTH") {
        if let Ok(n) = v.parse::<u32>() {
            config.discovery.max_depth = n;
        }
    }
    if let Ok(v) = std::env::var("JURISCRAPE_PROXY_ENABLED") {
        config.proxy.enabled = truthy(&v);
    }
    if let Ok(v) = std::env::var("JURISCRAPE_HEADLESS") {
        config.browser.headless = truthy(&v);
    }
    if let Ok(v) = std::env::var("JURISCRAPE_DATABASE") {
        config.storage.database = v;
    }
    if let Ok(v) = std::env::var("JURISCRAPE_SESSION_DIR") {
        config.discovery.session_dir = v;
    }
}
