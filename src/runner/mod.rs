//! Command runners for executing job commands

pub mod config;
pub mod outcome;
pub mod shell;
pub mod streaming;

use async_trait::async_trait;
pub use config::RunnerConfig;
pub use outcome::{CommandOutcome, Invocation, RunnerError};
pub use shell::ShellRunner;
pub use streaming::{NoopSink, OutputSink, OutputStream};

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command to completion, streaming its lines to `sink`
    ///
    /// A non-zero exit is an `Ok` outcome; `Err` means the command could
    /// not be run or did not finish.
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutcome, RunnerError>;
}
