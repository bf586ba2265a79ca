//! Argument vectors for the external tools
//!
//! Arguments are passed straight to the OS, never through a shell, so no
//! quoting is needed beyond what the filter graph syntax itself requires.

use std::fmt;

use crate::config::{BroadcastConfig, ChannelConfig, EncoderConfig};

/// Program plus arguments, spawned as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a `tokio::process::Command` with the program and arguments
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// `yt-dlp -o - <url>`: write the downloaded media to stdout
pub fn source_command(broadcast: &BroadcastConfig, url: &str) -> CommandSpec {
    CommandSpec::new(&broadcast.source_program).args(["-o", "-", url])
}

/// Transcoder reading the source tool's output from stdin
pub fn piped_transcoder_command(
    broadcast: &BroadcastConfig,
    encoder: &EncoderConfig,
    channel: &ChannelConfig,
) -> CommandSpec {
    let command = CommandSpec::new(&broadcast.transcoder_program)
        .args(["-re", "-i", "pipe:0"])
        .args(["-c:v", encoder.video_codec.as_str()])
        .args(["-preset", encoder.preset.as_str()])
        .args(["-tune", encoder.tune.as_str()])
        .args(["-maxrate", encoder.max_rate.as_str()])
        .args(["-bufsize", encoder.buffer_size.as_str()])
        .args(["-pix_fmt", encoder.pixel_format.as_str()])
        .arg("-g")
        .arg(encoder.gop.to_string())
        .arg("-vf")
        .arg(filter_graph(encoder, &channel.name))
        .args(["-c:a", encoder.audio_codec.as_str()])
        .args(["-b:a", encoder.audio_bitrate.as_str()])
        .arg("-ar")
        .arg(encoder.audio_sample_rate.to_string());

    with_mpegts_output(command, encoder, channel)
}

/// Transcoder rendering a libavfilter generator (test pattern)
pub fn generator_transcoder_command(
    broadcast: &BroadcastConfig,
    encoder: &EncoderConfig,
    channel: &ChannelConfig,
    spec: &str,
) -> CommandSpec {
    let command = CommandSpec::new(&broadcast.transcoder_program)
        .args(["-re", "-f", "lavfi", "-i", spec])
        .args(["-c:v", encoder.video_codec.as_str()])
        .args(["-preset", encoder.generator_preset.as_str()])
        .args(["-tune", encoder.tune.as_str()])
        .args(["-pix_fmt", encoder.pixel_format.as_str()])
        .arg("-g")
        .arg(encoder.gop.to_string());

    with_mpegts_output(command, encoder, channel)
}

/// MPEG-TS muxer options and the UDP destination
///
/// The service id becomes the program number in the PAT; name and provider
/// end up in the SDT where players display them.
fn with_mpegts_output(
    command: CommandSpec,
    encoder: &EncoderConfig,
    channel: &ChannelConfig,
) -> CommandSpec {
    command
        .args(["-f", "mpegts"])
        .arg("-mpegts_service_id")
        .arg(channel.service_id.to_string())
        .arg("-metadata")
        .arg(format!("service_name={}", channel.name))
        .arg("-metadata")
        .arg(format!("service_provider={}", channel.provider))
        .arg(channel.udp_url(encoder.packet_size))
}

/// Scale, then optionally burn the channel name in a translucent box
fn filter_graph(encoder: &EncoderConfig, channel_name: &str) -> String {
    let scale = format!("scale={}:{}", encoder.width, encoder.height);
    if !encoder.watermark {
        return scale;
    }

    format!(
        "{},drawtext=text='{}':x=50:y=50:fontsize=48:fontcolor=white:box=1:boxcolor=black@0.5",
        scale,
        escape_drawtext(channel_name)
    )
}

/// Make a channel name safe inside a quoted drawtext value
fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            // a quote cannot be escaped inside a quoted filter value
            '\'' => escaped.push('\u{2019}'),
            '\\' | ':' | '%' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_source_command() {
        let config = AppConfig::default();
        let command = source_command(&config.broadcast, "https://example.com/v");
        assert_eq!(command.program, "yt-dlp");
        assert_eq!(command.args, vec!["-o", "-", "https://example.com/v"]);
    }

    #[test]
    fn test_piped_transcoder_reads_stdin_and_tags_service() {
        let config = AppConfig::default();
        let channel = &config.channels[0];
        let command = piped_transcoder_command(&config.broadcast, &config.encoder, channel);
        let args = &command.args;

        assert_eq!(command.program, "ffmpeg");
        assert_eq!(args[position(args, "-i") + 1], "pipe:0");
        assert_eq!(args[position(args, "-mpegts_service_id") + 1], "101");
        assert!(args.contains(&"service_name=Nature 4K".to_string()));
        assert!(args.contains(&"service_provider=Earth Cast".to_string()));
        assert_eq!(args.last().unwrap(), "udp://239.255.0.1:1234?pkt_size=1316");

        let filter = &args[position(args, "-vf") + 1];
        assert!(filter.starts_with("scale=1280:720,drawtext=text='Nature 4K'"));
    }

    #[test]
    fn test_generator_transcoder_uses_lavfi() {
        let config = AppConfig::default();
        let channel = &config.channels[3];
        let command = generator_transcoder_command(
            &config.broadcast,
            &config.encoder,
            channel,
            "testsrc=size=1920x1080:rate=30",
        );
        let args = &command.args;

        assert_eq!(args[position(args, "-f") + 1], "lavfi");
        assert_eq!(args[position(args, "-i") + 1], "testsrc=size=1920x1080:rate=30");
        assert_eq!(args[position(args, "-preset") + 1], "veryfast");
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert_eq!(args.last().unwrap(), "udp://239.255.0.4:1234?pkt_size=1316");
    }

    #[test]
    fn test_watermark_disabled() {
        let mut config = AppConfig::default();
        config.encoder.watermark = false;
        assert_eq!(filter_graph(&config.encoder, "Tech TV"), "scale=1280:720");
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("Plain"), "Plain");
        assert_eq!(escape_drawtext("News: 24/7"), "News\\: 24/7");
        assert_eq!(escape_drawtext("Bob's TV"), "Bob\u{2019}s TV");
        assert_eq!(escape_drawtext("100%"), "100\\%");
    }

    #[test]
    fn test_display() {
        let command = CommandSpec::new("cat").args(["-u", "file"]);
        assert_eq!(command.to_string(), "cat -u file");
    }
}
