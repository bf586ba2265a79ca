//! Channel Scanner
//!
//! Sweeps a multicast range and lists the channels that are on air.
//!
//! Usage: `scanner [START_IP] [LIMIT] [--json] [--config FILE]`

use anyhow::{Context, Result};
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_broadcaster::{config::AppConfig, scanner::ChannelScanner};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(version, about = "Find multicast IPTV channels that are on air")]
struct Args {
    /// First multicast group to probe
    start: Option<Ipv4Addr>,

    /// Number of consecutive groups to probe
    limit: Option<u16>,

    /// Print one JSON object per channel instead of a table
    #[arg(long)]
    json: bool,

    /// Config file to take scanner defaults from; must exist when given
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let json = args.json;

    let mut config = AppConfig::resolve(args.config.as_deref())
        .context("loading config")?
        .scanner;
    if let Some(start) = args.start {
        config.start_address = start;
    }
    if let Some(limit) = args.limit {
        config.limit = limit;
    }

    tracing::info!(
        "Scanning {} groups from {} on port {}",
        config.limit,
        config.start_address,
        config.port
    );

    let scanner = ChannelScanner::new(config);
    let found = scanner
        .scan(|progress| {
            if !json {
                eprint!("\rChecking {}... {:>3}%", progress.address, progress.percent());
            }
        })
        .await?;

    if json {
        for channel in &found {
            println!("{}", serde_json::to_string(channel)?);
        }
    } else {
        eprintln!();
        println!("\n=== Channels Found: {} ===", found.len());
        for channel in &found {
            let provider = channel.provider.as_deref().unwrap_or("unknown provider");
            println!(
                "  {} ({}) -> udp://@{}:{}",
                channel.service_name, provider, channel.address, channel.port
            );
        }
    }

    Ok(())
}
