// src/main.rs
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sports_stream_resolver::{run_pipeline, ResolverConfig};

/// Resolve scheduled sports broadcasts to live IPTV stream URLs.
#[derive(Debug, Parser)]
#[command(name = "sports-stream-resolver", version)]
struct Cli {
    /// Config file (TOML or JSON). Falls back to config/resolver.{toml,json}.
    #[arg(long, env = "RESOLVER_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the number of concurrent probe workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Override the per-probe timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip the ffmpeg decode fallback.
    #[arg(long)]
    no_fallback: bool,

    /// Stop issuing new probes after this many seconds.
    #[arg(long)]
    deadline: Option<u64>,

    /// Attach every resolved channel to events instead of the geo-capped
    /// selection.
    #[arg(long)]
    uncapped: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sports_stream_resolver={default_level},info")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut cfg = match &cli.config {
        Some(path) => ResolverConfig::load_from(path)?,
        None => ResolverConfig::load_default()?,
    };
    if let Some(workers) = cli.workers {
        cfg.probe.workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        cfg.probe.timeout_secs = timeout;
    }
    if cli.no_fallback {
        cfg.probe.use_fallback = false;
    }
    if let Some(deadline) = cli.deadline {
        cfg.probe.run_deadline_secs = deadline;
    }
    if cli.uncapped {
        cfg.mapping.enforce_geo_cap = false;
    }

    let summary = run_pipeline(&cfg).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
