//! Channel broadcasting
//!
//! Channel loops, the playback sessions they run, and the process
//! pipeline underneath.

pub mod channel;
pub mod command;
pub mod pipeline;
pub mod runner;
pub mod session;

pub use channel::{ChannelLoop, ChannelState, ChannelStatus, Playlist, StatusHandle};
pub use command::CommandSpec;
pub use pipeline::{ChildOutput, OnLaunched, ProcessPipeline, SessionOutcome};
pub use runner::Broadcaster;
pub use session::{PlaybackSession, ProcessSessionRunner, SessionPlan, SessionRunner};
