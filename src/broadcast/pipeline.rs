//! Producer → consumer process pipeline
//!
//! Two external processes joined by one pipe. The orchestrator holds both
//! ends: the producer's stdout (read end) and the consumer's stdin (write
//! end). Two tasks run per session and are joined before it completes:
//!
//! - producer task: relay bytes, wait for the producer to exit, then close
//!   the consumer's stdin exactly once
//! - consumer task: wait for the consumer to exit
//!
//! The consumer therefore sees end-of-input only after the producer is gone.

use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::broadcast::command::CommandSpec;
use crate::error::PipelineError;

/// Where the consumer's stdout/stderr go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildOutput {
    /// Pass through to the operator's console
    Inherit,
    #[default]
    Discard,
}

impl ChildOutput {
    fn stdio(self) -> Stdio {
        match self {
            ChildOutput::Inherit => Stdio::inherit(),
            ChildOutput::Discard => Stdio::null(),
        }
    }
}

/// Result of a session whose consumer exited cleanly
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    /// Producer exit status, `None` for single-process sessions or if it
    /// could not be collected
    pub producer_status: Option<ExitStatus>,
    /// Bytes relayed from producer to consumer
    pub bytes_relayed: u64,
}

/// Called once every process of a session has been spawned
pub type OnLaunched<'a> = &'a (dyn Fn() + Send + Sync);

/// Runs producer/consumer pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessPipeline {
    output: ChildOutput,
}

impl ProcessPipeline {
    pub fn new(output: ChildOutput) -> Self {
        Self { output }
    }

    /// Run `producer | consumer` until the consumer exits
    pub async fn run(
        &self,
        producer: &CommandSpec,
        consumer: &CommandSpec,
        on_launched: OnLaunched<'_>,
    ) -> Result<SessionOutcome, PipelineError> {
        let mut producer_child = producer
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::ProducerLaunch {
                program: producer.program.clone(),
                source,
            })?;

        let mut consumer_child = match consumer
            .to_command()
            .stdin(Stdio::piped())
            .stdout(self.output.stdio())
            .stderr(self.output.stdio())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                terminate(&mut producer_child, &producer.program).await;
                return Err(PipelineError::ConsumerLaunch {
                    program: consumer.program.clone(),
                    source,
                });
            }
        };

        tracing::debug!(
            "Pipeline started: {} (pid {:?}) | {} (pid {:?})",
            producer.program,
            producer_child.id(),
            consumer.program,
            consumer_child.id()
        );
        on_launched();

        // Both handles are piped above, so they are always present
        let reader = producer_child.stdout.take();
        let writer = consumer_child.stdin.take();

        let producer_task = drive_producer(producer_child, reader, writer, &producer.program);
        let consumer_task = consumer_child.wait();

        let ((producer_status, bytes_relayed), consumer_result) =
            tokio::join!(producer_task, consumer_task);

        let outcome = SessionOutcome {
            producer_status,
            bytes_relayed,
        };

        finish(consumer_result, &consumer.program).map(|()| outcome)
    }

    /// Run a consumer that needs no producer (generator sources)
    pub async fn run_single(
        &self,
        consumer: &CommandSpec,
        on_launched: OnLaunched<'_>,
    ) -> Result<SessionOutcome, PipelineError> {
        let mut child = consumer
            .to_command()
            .stdin(Stdio::null())
            .stdout(self.output.stdio())
            .stderr(self.output.stdio())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::ConsumerLaunch {
                program: consumer.program.clone(),
                source,
            })?;
        on_launched();

        let result = child.wait().await;
        finish(result, &consumer.program).map(|()| SessionOutcome::default())
    }
}

/// Relay, wait for producer exit, then close the write end
async fn drive_producer(
    mut producer: Child,
    reader: Option<ChildStdout>,
    mut writer: Option<ChildStdin>,
    program: &str,
) -> (Option<ExitStatus>, u64) {
    let mut bytes = 0;

    if let (Some(mut reader), Some(stdin)) = (reader, writer.as_mut()) {
        match tokio::io::copy(&mut reader, stdin).await {
            Ok(n) => bytes = n,
            // consumer went away; `reader` is dropped when this block ends,
            // which gives the producer a broken pipe so it exits too
            Err(e) => tracing::debug!("Relay from {} stopped: {}", program, e),
        }
    }

    let status = match producer.wait().await {
        Ok(status) => {
            if !status.success() {
                tracing::debug!("{} exited with {}", program, status);
            }
            Some(status)
        }
        Err(e) => {
            tracing::debug!("Failed to wait for {}: {}", program, e);
            None
        }
    };

    // producer has exited: signal end-of-input
    if let Some(mut stdin) = writer.take() {
        if let Err(e) = stdin.shutdown().await {
            tracing::debug!("Closing input after {} exited: {}", program, e);
        }
    }

    (status, bytes)
}

/// Kill and reap a producer whose consumer never started
async fn terminate(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill {}: {}", program, e);
    }
}

fn finish(result: std::io::Result<ExitStatus>, program: &str) -> Result<(), PipelineError> {
    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(PipelineError::ConsumerExit {
            program: program.to_string(),
            status,
        }),
        Err(source) => Err(PipelineError::ConsumerIo {
            program: program.to_string(),
            source,
        }),
    }
}
