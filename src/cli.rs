use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "juriscrape", about = "Judicial PDF discovery crawler")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a discovery session
    Discover {
        /// Resume from a previous session's checkpoint
        #[arg(long)]
        resume: Option<String>,

        /// Maximum crawl depth (overrides config; 0 = unlimited)
        #[arg(short, long)]
        depth: Option<u32>,

        /// Discovery mode: shallow, deep or full
        #[arg(short, long)]
        mode: Option<String>,

        /// Write emitted PDFs to this file as JSON lines
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show sessions, link counts and proxy pool health
    Status {
        /// Max sessions to list
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
    /// Export stored PDF links
    Export {
        /// Output format (json, csv, txt)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Only links with this status
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Refresh and inspect the proxy pool
    Proxies {
        /// Force a refresh even when the cache is fresh
        #[arg(long)]
        refresh: bool,
    },
}
