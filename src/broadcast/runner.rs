//! Multi-channel runner
//!
//! One tokio task per channel. Tasks share nothing but the session runner,
//! which is stateless.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::broadcast::channel::{ChannelLoop, ChannelStatus, StatusHandle};
use crate::broadcast::session::{ProcessSessionRunner, SessionRunner};
use crate::config::AppConfig;

/// Runs every configured channel concurrently
pub struct Broadcaster {
    loops: Vec<ChannelLoop>,
    statuses: Vec<StatusHandle>,
}

impl Broadcaster {
    /// Build one channel loop per configured channel
    pub fn new(config: &AppConfig, runner: Arc<dyn SessionRunner>) -> Self {
        let backoff = config.broadcast.backoff();
        let loops: Vec<ChannelLoop> = config
            .channels
            .iter()
            .map(|channel| ChannelLoop::new(channel.clone(), runner.clone(), backoff))
            .collect();
        let statuses = loops.iter().map(ChannelLoop::status).collect();

        Self { loops, statuses }
    }

    /// Broadcaster that spawns the configured external tools
    pub fn with_processes(config: &AppConfig) -> Self {
        let runner = ProcessSessionRunner::new(config.broadcast.clone(), config.encoder.clone());
        Self::new(config, Arc::new(runner))
    }

    pub fn channel_count(&self) -> usize {
        self.statuses.len()
    }

    /// Status handles, valid before and after `run` is called
    pub fn status_handles(&self) -> Vec<StatusHandle> {
        self.statuses.clone()
    }

    /// Current status of every channel, in configuration order
    pub fn statuses(&self) -> Vec<ChannelStatus> {
        self.statuses.iter().map(StatusHandle::snapshot).collect()
    }

    /// Run all channels until every loop has exited
    ///
    /// Channel loops do not exit on their own, so in practice this returns
    /// only if every channel had nothing to play. Dropping the returned
    /// future aborts the channel tasks, which kills their child processes.
    pub async fn run(self) {
        tracing::info!("Starting {} channels", self.loops.len());

        let mut names = Vec::with_capacity(self.loops.len());
        let mut tasks = Vec::with_capacity(self.loops.len());
        for channel_loop in self.loops {
            names.push(channel_loop.channel().name.clone());
            tasks.push(AbortOnDrop(tokio::spawn(channel_loop.run())));
        }

        let results = join_all(tasks.into_iter().map(|task| task.join())).await;

        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!("Channel {} task ended abnormally: {}", name, e);
            }
        }
    }
}

/// Aborts the wrapped task if the handle is dropped before it finishes
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl AbortOnDrop {
    async fn join(mut self) -> Result<(), tokio::task::JoinError> {
        (&mut self.0).await
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::channel::tests::{channel, Script, ScriptedRunner};
    use crate::config::AppConfig;
    use std::time::Duration;

    fn config_with(channels: Vec<crate::config::ChannelConfig>) -> AppConfig {
        AppConfig {
            channels,
            ..AppConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_channel_does_not_slow_healthy_one() {
        let mut runner = ScriptedRunner::failing("bad-1", Script::ProducerLaunch);
        runner.scripts.insert("bad-2".into(), Script::ConsumerLaunch);
        runner.play_time = Duration::from_secs(1);
        let runner = Arc::new(runner);

        let config = config_with(vec![
            channel("Broken", 1, &["bad-1", "bad-2"]),
            channel("Healthy", 2, &["ok-1", "ok-2"]),
        ]);
        let broadcaster = Broadcaster::new(&config, runner.clone());
        let handles = broadcaster.status_handles();
        let task = tokio::spawn(broadcaster.run());

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        task.abort();

        let broken = handles[0].snapshot();
        let healthy = handles[1].snapshot();

        // 1s play + 5s backoff per broken session; 1s per healthy one
        assert_eq!(broken.sessions_started, 3);
        assert_eq!(broken.failures, 2);
        assert!(healthy.sessions_started >= 12, "healthy ran {}", healthy.sessions_started);
        assert_eq!(healthy.failures, 0);
        assert!(healthy.cycles_completed >= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_channel_is_started() {
        let runner = Arc::new(ScriptedRunner {
            play_time: Duration::from_secs(60),
            ..ScriptedRunner::default()
        });
        let config = config_with(vec![
            channel("One", 1, &["a"]),
            channel("Two", 2, &["b"]),
            channel("Three", 3, &["c"]),
        ]);

        let broadcaster = Broadcaster::new(&config, runner.clone());
        assert_eq!(broadcaster.channel_count(), 3);
        let task = tokio::spawn(broadcaster.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        task.abort();

        let mut played = runner.played();
        played.sort();
        assert_eq!(played, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_run_returns_when_no_channel_can_play() {
        let runner = Arc::new(ScriptedRunner::default());
        let config = config_with(vec![channel("Empty", 1, &[])]);

        let broadcaster = Broadcaster::new(&config, runner.clone());
        let statuses = broadcaster.statuses();
        assert_eq!(statuses[0].name, "Empty");

        tokio::time::timeout(Duration::from_secs(5), broadcaster.run())
            .await
            .expect("runner should return once every loop has exited");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_run_aborts_channel_tasks() {
        let runner = Arc::new(ScriptedRunner {
            play_time: Duration::from_secs(1),
            ..ScriptedRunner::default()
        });
        let config = config_with(vec![channel("Loop", 1, &["a"])]);
        let broadcaster = Broadcaster::new(&config, runner.clone());
        let handles = broadcaster.status_handles();

        let _ = tokio::time::timeout(Duration::from_millis(2_500), broadcaster.run()).await;
        let after_drop = handles[0].snapshot().sessions_started;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handles[0].snapshot().sessions_started, after_drop);
    }
}
