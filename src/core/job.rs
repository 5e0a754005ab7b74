//! Job domain model - one matrix cell and its commands

use crate::core::{
    command::Command,
    config::CiConfig,
    context::JobContext,
    matrix::MatrixCell,
    state::{ExecutionStatus, JobState, StepState},
    Phase,
};

/// What a step does when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A command from the descriptor
    Shell,
    /// The synthesised OS package installation
    AptInstall,
}

/// One command of a job, with its runtime state
#[derive(Debug, Clone)]
pub struct Step {
    pub phase: Phase,
    pub kind: StepKind,
    pub command: Command,
    pub state: StepState,
}

impl Step {
    fn new(phase: Phase, kind: StepKind, command: Command, channel: &str) -> Self {
        let state = match &command.gate {
            Some(gate) if !gate.allows(channel) => StepState::Skipped {
                reason: gate.to_string(),
            },
            _ => StepState::Pending,
        };
        Self {
            phase,
            kind,
            command,
            state,
        }
    }
}

/// A job: one resolved matrix cell
#[derive(Debug, Clone)]
pub struct Job {
    /// 1-based job number within the build
    pub number: usize,

    pub channel: String,

    /// Matrix env entry, verbatim
    pub env_entry: Option<String>,

    pub allow_failure: bool,

    /// Environment the commands run in
    pub context: JobContext,

    /// Commands in phase order
    pub steps: Vec<Step>,

    pub state: JobState,
}

/// Build the package installation command for `addons.apt.packages`
pub fn apt_install_command(packages: &[String], sudo: bool) -> String {
    let prefix = if sudo { "sudo " } else { "" };
    format!(
        "{prefix}apt-get update -qq && {prefix}apt-get install -y --no-install-recommends {}",
        packages.join(" ")
    )
}

impl Job {
    /// Create a job for a matrix cell
    pub fn from_cell(cell: &MatrixCell, config: &CiConfig) -> Self {
        let mut steps = Vec::new();

        let packages = config.apt_packages();
        if !packages.is_empty() {
            steps.push(Step::new(
                Phase::Apt,
                StepKind::AptInstall,
                Command {
                    run: apt_install_command(packages, config.requires_sudo()),
                    gate: None,
                },
                &cell.channel,
            ));
        }

        for phase in Phase::ALL {
            for entry in config.effective_entries(phase) {
                steps.push(Step::new(
                    phase,
                    StepKind::Shell,
                    Command::from_entry(&entry),
                    &cell.channel,
                ));
            }
        }

        Job {
            number: cell.number,
            channel: cell.channel.clone(),
            env_entry: cell.env_entry.clone(),
            allow_failure: cell.allow_failure,
            context: JobContext::for_cell(cell),
            steps,
            state: JobState::new(),
        }
    }

    /// Short human label, e.g. `#2 nightly FEATURES=a`
    pub fn label(&self) -> String {
        match &self.env_entry {
            Some(env) => format!("#{} {} {}", self.number, self.channel, env),
            None => format!("#{} {}", self.number, self.channel),
        }
    }

    /// Indices of the steps belonging to a phase
    pub fn step_indices(&self, phase: Phase) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.phase == phase)
            .map(|(i, _)| i)
            .collect()
    }

    /// Steps belonging to a phase
    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Commands that actually ran, in order
    pub fn executed_commands(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.state.has_run())
            .map(|s| s.command.run.as_str())
            .collect()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status
    }

    /// Mark every step that has not run yet as skipped
    pub fn skip_remaining(&mut self, reason: &str) {
        for step in &mut self.steps {
            if matches!(step.state, StepState::Pending | StepState::Running { .. }) {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
    }

    /// Stop a job that will not run to completion
    pub fn cancel(&mut self, reason: &str) {
        self.skip_remaining(reason);
        self.state.finish(ExecutionStatus::Cancelled);
    }
}
