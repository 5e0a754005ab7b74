//! Build domain model - every job resolved from one descriptor

use crate::core::{
    command::channel_matches,
    config::CiConfig,
    job::Job,
    matrix::BuildMatrix,
    plan::{BuildPlan, JobPlan},
    state::{BuildState, ExecutionStatus},
};
use anyhow::Result;

/// A build: the resolved matrix of jobs for a descriptor
#[derive(Debug, Clone)]
pub struct Build {
    /// Descriptor name (usually the file it was loaded from)
    pub name: String,

    pub jobs: Vec<Job>,

    /// Settle as soon as every required job finished
    pub fast_finish: bool,

    /// Execution state
    pub state: BuildState,
}

impl Build {
    /// Resolve the matrix and create one job per cell
    pub fn from_config(name: impl Into<String>, config: &CiConfig) -> Result<Self> {
        let matrix = BuildMatrix::resolve(config)?;
        let jobs = matrix
            .cells
            .iter()
            .map(|cell| Job::from_cell(cell, config))
            .collect();

        Ok(Build {
            name: name.into(),
            jobs,
            fast_finish: matrix.fast_finish,
            state: BuildState::new(),
        })
    }

    /// Keep only the jobs running on one of `channels` (dated pins included)
    pub fn retain_channels(&mut self, channels: &[String]) {
        if channels.is_empty() {
            return;
        }
        self.jobs
            .retain(|job| channels.iter().any(|c| channel_matches(c, &job.channel)));
    }

    /// Override a variable in every job
    pub fn override_variable(&mut self, name: &str, value: &str) {
        for job in &mut self.jobs {
            job.context.set_override(name, value);
        }
    }

    /// Get a job by number
    pub fn job(&self, number: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.number == number)
    }

    /// Jobs whose failure fails the build
    pub fn required_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| !j.allow_failure)
    }

    /// Evaluate gates without running anything
    pub fn plan(&self) -> BuildPlan {
        BuildPlan {
            name: self.name.clone(),
            fast_finish: self.fast_finish,
            jobs: self.jobs.iter().map(JobPlan::for_job).collect(),
        }
    }

    /// Derive the build status from the required jobs
    ///
    /// Passed iff every required job passed; Errored when required jobs
    /// errored but none failed; Failed otherwise.
    pub fn settle_status(&self) -> ExecutionStatus {
        let mut errored = false;
        let mut failed = false;

        for job in self.required_jobs() {
            match job.status() {
                ExecutionStatus::Passed => {}
                ExecutionStatus::Errored => errored = true,
                _ => failed = true,
            }
        }

        if failed {
            ExecutionStatus::Failed
        } else if errored {
            ExecutionStatus::Errored
        } else {
            ExecutionStatus::Passed
        }
    }

    /// Whether every required job reached a final status
    pub fn required_jobs_finished(&self) -> bool {
        self.required_jobs().all(|j| j.status().is_finished())
    }

    /// Refresh the job counters in the build state
    pub fn update_state_counts(&mut self) {
        let statuses: Vec<ExecutionStatus> = self.jobs.iter().map(|j| j.status()).collect();
        self.state.update_counts(&statuses);
    }
}
