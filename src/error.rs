//! Error types for the broadcaster and scanner

use std::net::SocketAddr;
use std::process::ExitStatus;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single playback session
///
/// All of these are recovered inside the owning channel loop.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Producer `{program}` failed to start: {source}")]
    ProducerLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Consumer `{program}` failed to start: {source}")]
    ConsumerLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Consumer `{program}` exited with {status}")]
    ConsumerExit {
        program: String,
        status: ExitStatus,
    },

    #[error("Consumer `{program}` I/O failure: {source}")]
    ConsumerIo {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// True for the two start-up failures
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::ProducerLaunch { .. } | PipelineError::ConsumerLaunch { .. }
        )
    }

    /// Short machine-friendly tag, used in status snapshots
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ProducerLaunch { .. } => "producer_launch_failed",
            PipelineError::ConsumerLaunch { .. } => "consumer_launch_failed",
            PipelineError::ConsumerExit { .. } | PipelineError::ConsumerIo { .. } => {
                "consumer_run_failed"
            }
        }
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No channels configured")]
    NoChannels,

    #[error("Channel `{0}` has an empty playlist")]
    EmptyPlaylist(String),

    #[error("Duplicate channel name: {0}")]
    DuplicateName(String),

    #[error("Channels `{first}` and `{second}` both target {destination}")]
    DuplicateDestination {
        first: String,
        second: String,
        destination: SocketAddr,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

/// Multicast scanner errors
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Socket setup failed for {address}: {source}")]
    Socket {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to join multicast group {group}: {source}")]
    JoinFailed {
        group: std::net::Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("Address range overflows past {start} + {limit}")]
    RangeOverflow {
        start: std::net::Ipv4Addr,
        limit: u16,
    },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
