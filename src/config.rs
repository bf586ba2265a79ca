//! Configuration for the broadcaster and scanner
//!
//! Everything is loaded once at startup into an [`AppConfig`] and handed to
//! the components that need it. Nothing here is mutated after load.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broadcast: BroadcastConfig,
    pub encoder: EncoderConfig,
    pub scanner: ScannerConfig,
    pub channels: Vec<ChannelConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broadcast: BroadcastConfig::default(),
            encoder: EncoderConfig::default(),
            scanner: ScannerConfig::default(),
            channels: default_lineup(),
        }
    }
}

impl AppConfig {
    /// Default config file location (`<config dir>/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "iptv-test", "iptv-broadcaster")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse and validate a config from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML text
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load `path` if it exists, otherwise fall back to the built-in lineup
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("No config at {}, using built-in channel lineup", path.display());
            Ok(Self::default())
        }
    }

    /// Config for a command line: an explicit path must exist, the default
    /// path may be absent
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => Self::load_or_default(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let text = self.to_toml()?;
        std::fs::write(path, text).map_err(write_err)
    }

    /// Check the invariants the runtime relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        self.broadcast.validate()?;

        let mut names: HashSet<&str> = HashSet::new();
        let mut destinations: HashMap<SocketAddr, &str> = HashMap::new();

        for channel in &self.channels {
            channel.validate()?;

            if !names.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateName(channel.name.clone()));
            }

            let destination = channel.destination();
            if let Some(first) = destinations.insert(destination, channel.name.as_str()) {
                return Err(ConfigError::DuplicateDestination {
                    first: first.to_string(),
                    second: channel.name.clone(),
                    destination,
                });
            }
        }

        Ok(())
    }
}

/// Settings shared by every channel loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Source-acquisition tool (reads a URL, writes media to stdout)
    pub source_program: String,
    /// Transcoder/packager (reads stdin or a generator, writes UDP)
    pub transcoder_program: String,
    /// Pause after a failed session before moving to the next entry
    pub backoff_secs: u64,
    /// Inherit the transcoder's stdout/stderr instead of discarding them
    pub show_child_output: bool,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            source_program: "yt-dlp".to_string(),
            transcoder_program: "ffmpeg".to_string(),
            backoff_secs: DEFAULT_BACKOFF_SECS,
            show_child_output: false,
        }
    }
}

impl BroadcastConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("broadcast.source_program", &self.source_program),
            ("broadcast.transcoder_program", &self.transcoder_program),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "program name is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Transcoder settings, applied to every channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub video_codec: String,
    /// x264 preset for piped sources (several channels share one host)
    pub preset: String,
    /// x264 preset for generator sources
    pub generator_preset: String,
    pub tune: String,
    pub max_rate: String,
    pub buffer_size: String,
    pub pixel_format: String,
    /// Keyframe interval in frames
    pub gop: u32,
    pub width: u32,
    pub height: u32,
    /// Burn the channel name into the top-left corner
    pub watermark: bool,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    /// UDP payload size, a multiple of the 188-byte TS packet
    pub packet_size: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            generator_preset: "veryfast".to_string(),
            tune: "zerolatency".to_string(),
            max_rate: "2500k".to_string(),
            buffer_size: "5000k".to_string(),
            pixel_format: "yuv420p".to_string(),
            gop: 60,
            width: 1280,
            height: 720,
            watermark: true,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_sample_rate: 44100,
            packet_size: DEFAULT_PKT_SIZE,
        }
    }
}

/// Multicast sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub start_address: Ipv4Addr,
    pub port: u16,
    /// Number of consecutive group addresses to probe
    pub limit: u16,
    /// How long to wait for any packet before declaring a group silent
    pub peek_timeout_ms: u64,
    /// Per-read timeout while hunting for the SDT
    pub read_timeout_ms: u64,
    /// Total time spent hunting for the SDT on a live group
    pub hunt_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            start_address: DEFAULT_MULTICAST_BASE,
            port: DEFAULT_UDP_PORT,
            limit: 20,
            peek_timeout_ms: 200,
            read_timeout_ms: 500,
            hunt_ms: 2000,
        }
    }
}

impl ScannerConfig {
    pub fn peek_timeout(&self) -> Duration {
        Duration::from_millis(self.peek_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn hunt_duration(&self) -> Duration {
        Duration::from_millis(self.hunt_ms)
    }
}

/// One simulated broadcast channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Service name carried in the SDT
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    /// Provider name carried in the SDT
    pub provider: String,
    /// MPEG-TS program number
    pub service_id: u16,
    pub playlist: Vec<SourceRef>,
}

impl ChannelConfig {
    pub fn destination(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Output URL understood by the transcoder
    pub fn udp_url(&self, packet_size: usize) -> String {
        format!("udp://{}?pkt_size={}", self.destination(), packet_size)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "channels.name".to_string(),
                reason: "channel name is empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("channels[{}].port", self.name),
                reason: "port must be non-zero".to_string(),
            });
        }
        if self.playlist.is_empty() {
            return Err(ConfigError::EmptyPlaylist(self.name.clone()));
        }
        Ok(())
    }
}

/// A playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceRef {
    /// Fetched by the source tool and piped into the transcoder
    Url { url: String },
    /// libavfilter generator read directly by the transcoder
    Generator { spec: String },
}

impl SourceRef {
    pub fn url(url: impl Into<String>) -> Self {
        SourceRef::Url { url: url.into() }
    }

    pub fn generator(spec: impl Into<String>) -> Self {
        SourceRef::Generator { spec: spec.into() }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Url { url } => f.write_str(url),
            SourceRef::Generator { spec } => write!(f, "lavfi:{}", spec),
        }
    }
}

/// Built-in channel lineup
pub fn default_lineup() -> Vec<ChannelConfig> {
    let channel = |octet: u8, name: &str, provider: &str, service_id: u16, playlist: Vec<SourceRef>| {
        ChannelConfig {
            name: name.to_string(),
            address: IpAddr::V4(Ipv4Addr::new(239, 255, 0, octet)),
            port: DEFAULT_UDP_PORT,
            provider: provider.to_string(),
            service_id,
            playlist,
        }
    };

    vec![
        channel(1, "Nature 4K", "Earth Cast", 101, vec![
            SourceRef::url("https://www.youtube.com/watch?v=LXb3EKWsInQ"),
            SourceRef::url("https://www.youtube.com/watch?v=tO01J-M3g0U"),
        ]),
        channel(2, "Tech TV", "Geek Net", 102, vec![
            SourceRef::url("https://www.youtube.com/watch?v=jfKfPfyJRdk"),
            SourceRef::url("https://www.youtube.com/watch?v=fJ9rUzIMcZQ"),
        ]),
        channel(3, "Action Sports", "Adrenaline", 103, vec![
            SourceRef::url("https://www.youtube.com/watch?v=qQdN4Q9I4G0"),
            SourceRef::url("https://www.youtube.com/watch?v=x76VEPXYaI0"),
        ]),
        channel(4, "Sports 1 HD", "CableCompany", 104, vec![
            SourceRef::generator("testsrc=size=1920x1080:rate=30"),
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channels.len(), 4);
        assert_eq!(config.broadcast.backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_udp_url() {
        let config = AppConfig::default();
        assert_eq!(
            config.channels[0].udp_url(1316),
            "udp://239.255.0.1:1234?pkt_size=1316"
        );
    }

    #[test]
    fn test_toml_roundtrip_keeps_lineup() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.channels, config.channels);
    }

    #[test]
    fn test_parse_minimal_file() {
        let text = r#"
            [broadcast]
            backoff_secs = 2

            [[channels]]
            name = "Test"
            address = "239.1.1.1"
            port = 5000
            provider = "Lab"
            service_id = 7
            playlist = [
                { kind = "generator", spec = "smptebars" },
                { kind = "url", url = "https://example.com/v" },
            ]
        "#;

        let config = AppConfig::from_toml(text).unwrap();
        assert_eq!(config.broadcast.backoff_secs, 2);
        assert_eq!(config.broadcast.transcoder_program, "ffmpeg");
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].playlist[0], SourceRef::generator("smptebars"));
        assert_eq!(config.channels[0].playlist[1].to_string(), "https://example.com/v");
    }

    #[test]
    fn test_rejects_empty_playlist() {
        let mut config = AppConfig::default();
        config.channels[1].playlist.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyPlaylist(name)) if name == "Tech TV"
        ));
    }

    #[test]
    fn test_rejects_duplicate_destination() {
        let mut config = AppConfig::default();
        config.channels[1].address = config.channels[0].address;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateDestination { .. })
        ));
    }

    #[test]
    fn test_rejects_no_channels() {
        let mut config = AppConfig::default();
        config.channels.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.broadcast.show_child_output = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert!(loaded.broadcast.show_child_output);
        assert_eq!(loaded.channels, config.channels);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.channels.len(), default_lineup().len());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("typo.toml");
        let err = AppConfig::resolve(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let path = dir.path().join("config.toml");
        AppConfig::default().save(&path).unwrap();
        assert_eq!(AppConfig::resolve(Some(&path)).unwrap().channels.len(), default_lineup().len());
    }
}
