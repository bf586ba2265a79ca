//! # IPTV Broadcaster
//!
//! Simulated multicast IPTV channels for exercising players and set-top boxes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                     Broadcaster (broadcast::runner)                    │
//! │                                                                        │
//! │   ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐    │
//! │   │ Channel Loop     │  │ Channel Loop     │  │ Channel Loop     │    │
//! │   │ "Nature 4K"      │  │ "Tech TV"        │  │ "Sports 1 HD"    │    │
//! │   │ playlist cursor  │  │ playlist cursor  │  │ playlist cursor  │    │
//! │   └────────┬─────────┘  └────────┬─────────┘  └────────┬─────────┘    │
//! │            │ one playback session per entry            │              │
//! │            ▼                     ▼                     ▼              │
//! │   ┌──────────────────────────────────────┐   ┌──────────────────┐     │
//! │   │ yt-dlp ──stdout──► relay ──stdin──►  │   │ ffmpeg -f lavfi  │     │
//! │   │                          ffmpeg      │   │ (generator)      │     │
//! │   └──────────────────────────┬───────────┘   └────────┬─────────┘     │
//! └──────────────────────────────┼────────────────────────┼───────────────┘
//!                                │  MPEG-TS over UDP      │
//!                                ▼                        ▼
//!                       239.255.0.1:1234  ...    239.255.0.4:1234
//!                                │
//!                                ▼
//!                  Scanner (scanner::probe + scanner::sdt)
//! ```
//!
//! Channels never share state; a failure in one has no effect on the others.

pub mod config;
pub mod error;

#[cfg(feature = "broadcaster")]
pub mod broadcast;

#[cfg(feature = "scanner")]
pub mod scanner;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::net::Ipv4Addr;

    /// Default UDP port for every channel
    pub const DEFAULT_UDP_PORT: u16 = 1234;

    /// First group address of the built-in lineup
    pub const DEFAULT_MULTICAST_BASE: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);

    /// Pause after a failed playback session
    pub const DEFAULT_BACKOFF_SECS: u64 = 5;

    /// MPEG-TS packet size
    pub const TS_PACKET_SIZE: usize = 188;

    /// Default UDP payload: 7 TS packets fit a 1500-byte MTU
    pub const DEFAULT_PKT_SIZE: usize = TS_PACKET_SIZE * 7;

    /// Largest datagram the scanner reads in one call
    pub const MAX_DATAGRAM_SIZE: usize = 4096;
}
