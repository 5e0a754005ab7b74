//! Execution state models

use crate::core::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status of a job or of the whole build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Not started yet
    Pending,
    /// Currently running
    Running,
    /// Every required command succeeded
    Passed,
    /// A `script` command failed
    Failed,
    /// A setup command failed before `script` started
    Errored,
    /// Stopped before finishing (fast finish)
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Running" => Ok(ExecutionStatus::Running),
            "Passed" => Ok(ExecutionStatus::Passed),
            "Failed" => Ok(ExecutionStatus::Failed),
            "Errored" => Ok(ExecutionStatus::Errored),
            "Cancelled" => Ok(ExecutionStatus::Cancelled),
            other => anyhow::bail!("Unknown execution status '{}'", other),
        }
    }
}

/// State of a single command within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Waiting for its turn
    Pending,
    /// Currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Exited with status 0
    Passed {
        output: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Exited non-zero, timed out, or could not be spawned
    Failed {
        exit_code: Option<i32>,
        error: String,
        output: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Not run, with the reason why
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Passed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StepState::Skipped { .. })
    }

    /// Whether the command actually ran (passed or failed)
    pub fn has_run(&self) -> bool {
        matches!(self, StepState::Passed { .. } | StepState::Failed { .. })
    }
}

/// Runtime state of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Phase in which the job errored or failed
    pub failed_phase: Option<Phase>,
}

impl JobState {
    pub fn new() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            failed_phase: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

/// Overall build state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    /// Unique build ID
    pub build_id: Uuid,

    /// Current build status
    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,
    pub passed_jobs: usize,
    pub failed_jobs: usize,
    pub errored_jobs: usize,
    pub cancelled_jobs: usize,
}

impl BuildState {
    /// Create a new build state
    pub fn new() -> Self {
        Self {
            build_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            passed_jobs: 0,
            failed_jobs: 0,
            errored_jobs: 0,
            cancelled_jobs: 0,
        }
    }

    /// Mark build as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Mark build as finished with its settled status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Recount job outcomes
    pub fn update_counts<'a>(&mut self, statuses: impl IntoIterator<Item = &'a ExecutionStatus>) {
        self.passed_jobs = 0;
        self.failed_jobs = 0;
        self.errored_jobs = 0;
        self.cancelled_jobs = 0;
        for status in statuses {
            match status {
                ExecutionStatus::Passed => self.passed_jobs += 1,
                ExecutionStatus::Failed => self.failed_jobs += 1,
                ExecutionStatus::Errored => self.errored_jobs += 1,
                ExecutionStatus::Cancelled => self.cancelled_jobs += 1,
                _ => {}
            }
        }
    }

    /// Finished jobs over total (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        let finished = self.passed_jobs + self.failed_jobs + self.errored_jobs + self.cancelled_jobs;
        finished as f64 / self.total_jobs as f64
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}
