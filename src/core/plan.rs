//! Dry-run view of a build: which commands each job would run

use crate::core::{job::Job, state::StepState, Phase};
use serde::{Deserialize, Serialize};

/// What the runner will do with a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    /// Runs unconditionally (subject to fail-fast)
    Run,
    /// Runs only if the job passes
    RunOnSuccess,
    /// Runs only if `script` fails
    RunOnFailure,
    /// Never runs for this job
    Skip(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub phase: Phase,
    pub command: String,
    pub action: PlannedAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPlan {
    pub number: usize,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    pub allow_failure: bool,
    pub steps: Vec<PlannedStep>,
}

impl JobPlan {
    pub fn for_job(job: &Job) -> Self {
        let steps = job
            .steps
            .iter()
            .map(|step| {
                let action = match (&step.state, step.phase) {
                    (StepState::Skipped { reason }, _) => PlannedAction::Skip(reason.clone()),
                    (_, Phase::AfterSuccess) => PlannedAction::RunOnSuccess,
                    (_, Phase::AfterFailure) => PlannedAction::RunOnFailure,
                    _ => PlannedAction::Run,
                };
                PlannedStep {
                    phase: step.phase,
                    command: step.command.run.clone(),
                    action,
                }
            })
            .collect();

        Self {
            number: job.number,
            channel: job.channel.clone(),
            env: job.env_entry.clone(),
            allow_failure: job.allow_failure,
            steps,
        }
    }

    /// Commands that run on every execution of this job
    pub fn commands_to_run(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.action == PlannedAction::Run)
            .map(|s| s.command.as_str())
            .collect()
    }

    /// Commands that never run for this job
    pub fn skipped_commands(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, PlannedAction::Skip(_)))
            .map(|s| s.command.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub name: String,
    pub fast_finish: bool,
    pub jobs: Vec<JobPlan>,
}

impl BuildPlan {
    /// Plan for the first job on `channel`
    pub fn job_for_channel(&self, channel: &str) -> Option<&JobPlan> {
        self.jobs.iter().find(|j| j.channel == channel)
    }
}
