//! Command invocation and outcome types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for running a command
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn shell: {0}")]
    Spawn(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command to run on behalf of a job
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Label of the job running the command, for output routing
    pub job: String,

    /// Shell text
    pub command: String,

    /// Variables set on top of the runner's own environment
    pub env: HashMap<String, String>,

    pub working_dir: PathBuf,
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,

    /// Combined stdout and stderr, line by line
    pub output: String,

    pub duration_ms: u64,

    /// Variables the command left changed in its shell, if captured
    pub exported: HashMap<String, String>,
}

impl CommandOutcome {
    /// Create an outcome with only an exit code and output
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            duration_ms: 0,
            exported: HashMap::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
