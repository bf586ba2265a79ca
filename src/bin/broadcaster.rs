//! Channel Broadcaster
//!
//! Runs every configured channel as a looping multicast stream.
//!
//! Usage: `broadcaster [CONFIG] [--print-config]`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_broadcaster::{broadcast::Broadcaster, config::AppConfig};

/// How often the channel summary is logged
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Command line arguments
#[derive(Parser, Debug)]
#[command(version, about = "Broadcast looping playlists as multicast MPEG-TS channels")]
struct Args {
    /// Config file; must exist when given (default: the per-user config, if any)
    config: Option<PathBuf>,

    /// Print the built-in config as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.print_config {
        print!("{}", AppConfig::default().to_toml()?);
        return Ok(());
    }

    let config = AppConfig::resolve(args.config.as_deref()).context("loading config")?;

    tracing::info!("Starting Multi-Channel Broadcaster");

    println!("\n=== Channel Lineup ===");
    for channel in &config.channels {
        println!("  {} (Provider: {}, Service ID: {}):", channel.name, channel.provider, channel.service_id);
        println!("    Output: {}", channel.udp_url(config.encoder.packet_size));
        for source in &channel.playlist {
            println!("    - {}", source);
        }
    }
    println!("\nOpen VLC and go to 'Media > Open Network Stream' to view. Press Ctrl+C to stop.\n");

    let broadcaster = Broadcaster::with_processes(&config);
    let handles = broadcaster.status_handles();

    let status_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            for status in handles.iter().map(|h| h.snapshot()) {
                tracing::info!(
                    "{}: {:?}, entry {:?}, {} sessions, {} failures, {} cycles",
                    status.name,
                    status.state,
                    status.current_entry,
                    status.sessions_started,
                    status.failures,
                    status.cycles_completed
                );
            }
        }
    });

    tokio::select! {
        _ = broadcaster.run() => {
            tracing::warn!("All channel loops exited");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl+C")?;
            tracing::info!("Shutting down, stopping all channels");
        }
    }

    status_task.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["broadcaster", "channels.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("channels.toml")));
        assert!(!args.print_config);

        let args = Args::try_parse_from(["broadcaster", "--print-config"]).unwrap();
        assert!(args.print_config);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_unknown_flags_rejected() {
        assert!(Args::try_parse_from(["broadcaster", "--bogus"]).is_err());
        assert!(Args::try_parse_from(["broadcaster", "a.toml", "b.toml"]).is_err());

        let err = Args::try_parse_from(["broadcaster", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
