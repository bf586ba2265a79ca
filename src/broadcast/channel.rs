//! Per-channel playback loop
//!
//! Each channel cycles through its playlist forever:
//!
//! ```text
//! Idle ──► Starting ──► Streaming ──► Settling ──► Idle ...
//!  ▲                                     │
//!  └──────── next entry (wraps) ◄────────┘
//! ```
//!
//! A failed session is logged, followed by a fixed backoff, and the loop
//! moves on to the next entry. Nothing a session does can end the loop.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::broadcast::session::SessionRunner;
use crate::config::{ChannelConfig, SourceRef};
use crate::error::PipelineError;

/// Where a channel is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Between sessions
    Idle,
    /// Entry chosen, processes being launched
    Starting,
    /// Session running
    Streaming,
    /// Session over, recording outcome and backing off if needed
    Settling,
}

/// Wrapping cursor over a playlist
#[derive(Debug, Clone)]
pub struct Playlist {
    entries: Vec<SourceRef>,
    position: usize,
    cycles: u64,
}

impl Playlist {
    /// `None` for an empty playlist, which has nothing to loop over
    pub fn new(entries: Vec<SourceRef>) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        Some(Self {
            entries,
            position: 0,
            cycles: 0,
        })
    }

    /// Take the next entry, wrapping to the head after the last one
    pub fn advance(&mut self) -> (usize, &SourceRef) {
        let index = self.position;
        self.position += 1;
        if self.position == self.entries.len() {
            self.position = 0;
            self.cycles += 1;
        }
        (index, &self.entries[index])
    }

    /// Index the next call to `advance` returns
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of times the whole playlist has been handed out
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Observable state of one channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub name: String,
    pub destination: SocketAddr,
    pub state: ChannelState,
    pub current_entry: Option<usize>,
    pub current_source: Option<String>,
    pub sessions_started: u64,
    pub failures: u64,
    pub cycles_completed: u64,
    pub last_error: Option<String>,
    pub last_error_kind: Option<&'static str>,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl ChannelStatus {
    fn new(channel: &ChannelConfig) -> Self {
        Self {
            name: channel.name.clone(),
            destination: channel.destination(),
            state: ChannelState::Idle,
            current_entry: None,
            current_source: None,
            sessions_started: 0,
            failures: 0,
            cycles_completed: 0,
            last_error: None,
            last_error_kind: None,
            last_started_at: None,
        }
    }
}

/// Shared handle for reading a channel's status while it runs
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<Mutex<ChannelStatus>>);

impl StatusHandle {
    pub fn snapshot(&self) -> ChannelStatus {
        self.0.lock().clone()
    }

    fn update(&self, f: impl FnOnce(&mut ChannelStatus)) {
        f(&mut self.0.lock());
    }
}

/// Drives one channel's playlist
pub struct ChannelLoop {
    channel: ChannelConfig,
    runner: Arc<dyn SessionRunner>,
    backoff: Duration,
    status: StatusHandle,
}

impl ChannelLoop {
    pub fn new(channel: ChannelConfig, runner: Arc<dyn SessionRunner>, backoff: Duration) -> Self {
        let status = StatusHandle(Arc::new(Mutex::new(ChannelStatus::new(&channel))));
        Self {
            channel,
            runner,
            backoff,
            status,
        }
    }

    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Loop over the playlist until the future is dropped
    pub async fn run(self) {
        let span = tracing::info_span!("channel", name = %self.channel.name);
        self.run_forever().instrument(span).await
    }

    async fn run_forever(self) {
        let Some(mut playlist) = Playlist::new(self.channel.playlist.clone()) else {
            tracing::warn!("Playlist is empty, channel stays off air");
            return;
        };

        tracing::info!(
            "Channel online -> udp://{} ({} entries)",
            self.channel.destination(),
            playlist.len()
        );

        loop {
            let cycles_before = playlist.cycles();
            let _ = self.play_next(&mut playlist).await;

            if playlist.cycles() > cycles_before {
                tracing::info!("Playlist finished, looping (cycle {})", playlist.cycles());
            }
        }
    }

    /// Play one entry and settle, backing off after a failure
    ///
    /// The error is returned for inspection only; the loop never stops on it.
    pub async fn play_next(&self, playlist: &mut Playlist) -> Result<(), PipelineError> {
        let (index, source) = playlist.advance();
        let source = source.clone();
        let cycles = playlist.cycles();

        self.status.update(|s| {
            s.state = ChannelState::Starting;
            s.current_entry = Some(index);
            s.current_source = Some(source.to_string());
            s.sessions_started += 1;
            s.last_started_at = Some(Utc::now());
        });
        tracing::info!("Now playing [{}]: {}", index, source);

        let status = self.status.clone();
        let on_launched = move || status.update(|s| s.state = ChannelState::Streaming);
        let result = self.runner.play(&self.channel, &source, &on_launched).await;

        self.status.update(|s| {
            s.state = ChannelState::Settling;
            s.cycles_completed = cycles;
        });

        if let Err(e) = &result {
            if e.is_launch_failure() {
                tracing::warn!("Could not start entry {}: {}", index, e);
            } else {
                tracing::warn!("Stream error on entry {}: {}", index, e);
            }
            self.status.update(|s| {
                s.failures += 1;
                s.last_error = Some(e.to_string());
                s.last_error_kind = Some(e.kind());
            });
            // keeps an unreachable source from spinning the loop
            tokio::time::sleep(self.backoff).await;
        }

        self.status.update(|s| s.state = ChannelState::Idle);
        result
    }
}
