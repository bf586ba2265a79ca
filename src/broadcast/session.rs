//! Playback sessions
//!
//! A session plays one playlist entry: either a producer/consumer pair
//! (URL sources) or a lone consumer (generator sources).

use async_trait::async_trait;
use uuid::Uuid;

use crate::broadcast::command::{
    generator_transcoder_command, piped_transcoder_command, source_command, CommandSpec,
};
use crate::broadcast::pipeline::{ChildOutput, OnLaunched, ProcessPipeline, SessionOutcome};
use crate::config::{BroadcastConfig, ChannelConfig, EncoderConfig, SourceRef};
use crate::error::PipelineError;

/// The processes that make up one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub producer: Option<CommandSpec>,
    pub consumer: CommandSpec,
}

impl SessionPlan {
    /// Build the plan for one playlist entry of `channel`
    pub fn for_source(
        broadcast: &BroadcastConfig,
        encoder: &EncoderConfig,
        channel: &ChannelConfig,
        source: &SourceRef,
    ) -> Self {
        match source {
            SourceRef::Url { url } => Self {
                producer: Some(source_command(broadcast, url)),
                consumer: piped_transcoder_command(broadcast, encoder, channel),
            },
            SourceRef::Generator { spec } => Self {
                producer: None,
                consumer: generator_transcoder_command(broadcast, encoder, channel, spec),
            },
        }
    }
}

/// One playlist entry being played
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub plan: SessionPlan,
}

impl PlaybackSession {
    pub fn new(plan: SessionPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan,
        }
    }

    /// Run to completion on `pipeline`
    pub async fn run(
        &self,
        pipeline: &ProcessPipeline,
        on_launched: OnLaunched<'_>,
    ) -> Result<SessionOutcome, PipelineError> {
        match &self.plan.producer {
            Some(producer) => pipeline.run(producer, &self.plan.consumer, on_launched).await,
            None => pipeline.run_single(&self.plan.consumer, on_launched).await,
        }
    }
}

/// Plays a single playlist entry for a channel
///
/// `on_launched` is called once the session's processes are all running and
/// is never called for a launch failure. Returns once every process of the
/// session has exited.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn play(
        &self,
        channel: &ChannelConfig,
        source: &SourceRef,
        on_launched: OnLaunched<'_>,
    ) -> Result<(), PipelineError>;
}

/// Runner that spawns the real external tools
#[derive(Debug, Clone)]
pub struct ProcessSessionRunner {
    broadcast: BroadcastConfig,
    encoder: EncoderConfig,
    pipeline: ProcessPipeline,
}

impl ProcessSessionRunner {
    pub fn new(broadcast: BroadcastConfig, encoder: EncoderConfig) -> Self {
        let output = if broadcast.show_child_output {
            ChildOutput::Inherit
        } else {
            ChildOutput::Discard
        };

        Self {
            broadcast,
            encoder,
            pipeline: ProcessPipeline::new(output),
        }
    }
}

#[async_trait]
impl SessionRunner for ProcessSessionRunner {
    async fn play(
        &self,
        channel: &ChannelConfig,
        source: &SourceRef,
        on_launched: OnLaunched<'_>,
    ) -> Result<(), PipelineError> {
        let plan = SessionPlan::for_source(&self.broadcast, &self.encoder, channel, source);
        let session = PlaybackSession::new(plan);

        tracing::debug!(session = %session.id, "Consumer: {}", session.plan.consumer);

        let outcome = session.run(&self.pipeline, on_launched).await?;

        tracing::debug!(
            session = %session.id,
            "Session finished, {} bytes relayed, producer status {:?}",
            outcome.bytes_relayed,
            outcome.producer_status
        );
        Ok(())
    }
}
