//! Job executor - runs one job's phases with fail-fast semantics

use crate::{
    core::{ExecutionStatus, Job, Phase, StepKind, StepState},
    execution::engine::{EventBus, ExecutionEvent},
    runner::{CommandRunner, Invocation, OutputSink, OutputStream, RunnerConfig},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Phases that decide the job result, in order
const GATING_PHASES: [Phase; 5] = [
    Phase::Apt,
    Phase::BeforeInstall,
    Phase::Install,
    Phase::BeforeScript,
    Phase::Script,
];

/// Forwards command output lines as execution events
struct EventSink<'a> {
    events: &'a EventBus,
}

impl OutputSink for EventSink<'_> {
    fn on_line(&self, job: &str, stream: OutputStream, line: &str) {
        self.events.emit(ExecutionEvent::CommandOutput {
            job: job.to_string(),
            stream,
            line: line.to_string(),
        });
    }
}

/// Executes a single job
pub struct JobExecutor<R> {
    runner: Arc<R>,
    config: RunnerConfig,
    events: EventBus,
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: Arc<R>, config: RunnerConfig, events: EventBus) -> Self {
        Self {
            runner,
            config,
            events,
        }
    }

    /// Run every phase of the job and return its final status
    ///
    /// Setup failures error the job, a `script` failure fails it. Either way
    /// the rest of the gating phases is skipped and only the matching
    /// `after_*` phases run.
    pub async fn execute(&self, job: &mut Job) -> ExecutionStatus {
        info!("Starting job {}", job.label());
        job.state.start();
        if job.context.working_dir.is_none() {
            job.context.working_dir = Some(self.config.resolve_working_dir());
        }

        self.events.emit(ExecutionEvent::JobStarted {
            job: job.label(),
            number: job.number,
            channel: job.channel.clone(),
        });

        let mut status = ExecutionStatus::Passed;

        for phase in GATING_PHASES {
            if status != ExecutionStatus::Passed {
                let reason = format!(
                    "job {} in {}",
                    status.to_string().to_lowercase(),
                    job.state.failed_phase.unwrap_or(phase)
                );
                self.skip_phase(job, phase, &reason);
                continue;
            }

            if self.run_phase(job, phase, true).await {
                status = if phase.is_setup() {
                    ExecutionStatus::Errored
                } else {
                    ExecutionStatus::Failed
                };
                job.state.failed_phase = Some(phase);
                error!("Job {} {} in {}", job.label(), status, phase);
            }
        }

        match status {
            ExecutionStatus::Passed => {
                self.run_phase(job, Phase::AfterSuccess, false).await;
                self.skip_phase(job, Phase::AfterFailure, "job passed");
            }
            ExecutionStatus::Failed => {
                self.skip_phase(job, Phase::AfterSuccess, "job failed");
                self.run_phase(job, Phase::AfterFailure, false).await;
            }
            _ => {
                self.skip_phase(job, Phase::AfterSuccess, "job errored");
                self.skip_phase(job, Phase::AfterFailure, "job errored");
            }
        }
        self.run_phase(job, Phase::AfterScript, false).await;

        job.state.finish(status);
        info!("Job {} finished: {}", job.label(), status);
        self.events.emit(ExecutionEvent::JobFinished {
            job: job.label(),
            number: job.number,
            status,
            allow_failure: job.allow_failure,
        });

        status
    }

    /// Run the steps of a phase; returns true if any step failed
    async fn run_phase(&self, job: &mut Job, phase: Phase, fail_fast: bool) -> bool {
        let indices = job.step_indices(phase);
        if indices.is_empty() {
            return false;
        }

        debug!("Job {} entering {}", job.label(), phase);
        self.events.emit(ExecutionEvent::PhaseStarted {
            job: job.label(),
            phase,
        });

        let mut failed = false;
        for index in indices {
            if let StepState::Skipped { reason } = &job.steps[index].state {
                self.emit_skipped(job, index, reason.clone());
                continue;
            }

            if failed && fail_fast {
                self.mark_skipped(job, index, "previous command failed");
                continue;
            }

            if job.steps[index].kind == StepKind::AptInstall && !self.config.install_packages {
                self.mark_skipped(
                    job,
                    index,
                    "package installation disabled (pass --install-packages)",
                );
                continue;
            }

            if !self.run_step(job, index).await {
                failed = true;
                if phase.is_after() {
                    warn!(
                        "Ignoring failure in {} of job {}: {}",
                        phase,
                        job.label(),
                        job.steps[index].command.run
                    );
                }
            }
        }

        failed
    }

    /// Run one step; returns true on exit status 0
    async fn run_step(&self, job: &mut Job, index: usize) -> bool {
        let started_at = Utc::now();
        let phase = job.steps[index].phase;
        let command = job.steps[index].command.run.clone();

        let invocation = Invocation {
            job: job.label(),
            command: command.clone(),
            env: job.context.environment(),
            working_dir: job
                .context
                .working_dir
                .clone()
                .unwrap_or_else(|| self.config.resolve_working_dir()),
        };

        job.steps[index].state = StepState::Running { started_at };
        self.events.emit(ExecutionEvent::CommandStarted {
            job: job.label(),
            phase,
            command: command.clone(),
        });

        let sink = EventSink {
            events: &self.events,
        };
        let result = self.runner.run(&invocation, Some(&sink)).await;
        let finished_at = Utc::now();

        match result {
            Ok(outcome) => {
                job.context.apply_exports(outcome.exported.clone());
                let exit_code = outcome.exit_code;

                job.steps[index].state = if outcome.success() {
                    StepState::Passed {
                        output: outcome.output,
                        started_at,
                        finished_at,
                    }
                } else {
                    StepState::Failed {
                        exit_code: Some(exit_code),
                        error: format!("exited with code {}", exit_code),
                        output: outcome.output,
                        started_at,
                        finished_at,
                    }
                };

                self.events.emit(ExecutionEvent::CommandFinished {
                    job: job.label(),
                    phase,
                    command,
                    exit_code,
                    duration_ms: outcome.duration_ms,
                });
                exit_code == 0
            }
            Err(e) => {
                error!("Command could not run in job {}: {}", job.label(), e);
                job.steps[index].state = StepState::Failed {
                    exit_code: None,
                    error: e.to_string(),
                    output: String::new(),
                    started_at,
                    finished_at,
                };
                self.events.emit(ExecutionEvent::CommandFailed {
                    job: job.label(),
                    phase,
                    command,
                    error: e.to_string(),
                });
                false
            }
        }
    }

    fn skip_phase(&self, job: &mut Job, phase: Phase, reason: &str) {
        for index in job.step_indices(phase) {
            match &job.steps[index].state {
                StepState::Skipped { reason } => {
                    let reason = reason.clone();
                    self.emit_skipped(job, index, reason);
                }
                _ => self.mark_skipped(job, index, reason),
            }
        }
    }

    fn mark_skipped(&self, job: &mut Job, index: usize, reason: &str) {
        job.steps[index].state = StepState::Skipped {
            reason: reason.to_string(),
        };
        self.emit_skipped(job, index, reason.to_string());
    }

    fn emit_skipped(&self, job: &Job, index: usize, reason: String) {
        let step = &job.steps[index];
        debug!("Skipping '{}' in job {}: {}", step.command.run, job.label(), reason);
        self.events.emit(ExecutionEvent::CommandSkipped {
            job: job.label(),
            phase: step.phase,
            command: step.command.run.clone(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{config::CiConfig, Build};
    use crate::runner::{CommandOutcome, RunnerError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fails every command containing one of the given fragments
    #[derive(Default)]
    struct ScriptedRunner {
        failing: Vec<String>,
        exports: HashMap<String, HashMap<String, String>>,
        calls: Mutex<Vec<(String, HashMap<String, String>)>>,
    }

    impl ScriptedRunner {
        fn failing(fragments: &[&str]) -> Self {
            Self {
                failing: fragments.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn commands(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            invocation: &Invocation,
            _sink: Option<&dyn OutputSink>,
        ) -> Result<CommandOutcome, RunnerError> {
            self.calls
                .lock()
                .unwrap()
                .push((invocation.command.clone(), invocation.env.clone()));
            let code = if self.failing.iter().any(|f| invocation.command.contains(f)) {
                1
            } else {
                0
            };
            let mut outcome = CommandOutcome::new(code, "");
            if let Some(exports) = self.exports.get(&invocation.command) {
                outcome.exported = exports.clone();
            }
            Ok(outcome)
        }
    }

    const DESCRIPTOR: &str = r#"
language: rust
before_script:
  - setup-tools
script:
  - cargo build
  - cargo test
  - cargo fmt -- --check
after_success:
  - upload-coverage
after_failure:
  - dump-logs
after_script:
  - cleanup
"#;

    fn job() -> Job {
        let config = CiConfig::from_yaml(DESCRIPTOR).unwrap();
        Build::from_config("test", &config).unwrap().jobs.remove(0)
    }

    fn executor(runner: Arc<ScriptedRunner>) -> JobExecutor<ScriptedRunner> {
        JobExecutor::new(runner, RunnerConfig::new().with_working_dir("/tmp"), EventBus::default())
    }

    #[tokio::test]
    async fn test_passing_job_runs_after_success() {
        let runner = Arc::new(ScriptedRunner::default());
        let mut job = job();

        let status = executor(runner.clone()).execute(&mut job).await;

        assert_eq!(status, ExecutionStatus::Passed);
        assert_eq!(
            runner.commands(),
            vec![
                "setup-tools",
                "cargo build",
                "cargo test",
                "cargo fmt -- --check",
                "upload-coverage",
                "cleanup"
            ]
        );
    }

    #[tokio::test]
    async fn test_script_failure_is_fail_fast() {
        let runner = Arc::new(ScriptedRunner::failing(&["cargo test"]));
        let mut job = job();

        let status = executor(runner.clone()).execute(&mut job).await;

        assert_eq!(status, ExecutionStatus::Failed);
        assert_eq!(job.state.failed_phase, Some(Phase::Script));
        assert_eq!(
            runner.commands(),
            vec!["setup-tools", "cargo build", "cargo test", "dump-logs", "cleanup"]
        );
        let fmt = job.steps.iter().find(|s| s.command.run.starts_with("cargo fmt")).unwrap();
        assert!(fmt.state.is_skipped());
    }

    #[tokio::test]
    async fn test_setup_failure_errors_job() {
        let runner = Arc::new(ScriptedRunner::failing(&["setup-tools"]));
        let mut job = job();

        let status = executor(runner.clone()).execute(&mut job).await;

        assert_eq!(status, ExecutionStatus::Errored);
        assert_eq!(job.state.failed_phase, Some(Phase::BeforeScript));
        assert_eq!(runner.commands(), vec!["setup-tools", "cleanup"]);
    }

    #[tokio::test]
    async fn test_after_phase_failures_do_not_change_status() {
        let runner = Arc::new(ScriptedRunner::failing(&["upload-coverage", "cleanup"]));
        let mut job = job();

        let status = executor(runner).execute(&mut job).await;
        assert_eq!(status, ExecutionStatus::Passed);
    }

    #[tokio::test]
    async fn test_apt_step_skipped_unless_enabled() {
        let yaml = r#"
addons:
  apt:
    packages: [libdw-dev]
script: [make]
"#;
        let config = CiConfig::from_yaml(yaml).unwrap();
        let mut job = Build::from_config("apt", &config).unwrap().jobs.remove(0);

        let runner = Arc::new(ScriptedRunner::default());
        let status = executor(runner.clone()).execute(&mut job).await;
        assert_eq!(status, ExecutionStatus::Passed);
        assert_eq!(runner.commands(), vec!["make"]);
        assert!(job.steps[0].state.is_skipped());

        let mut job = Build::from_config("apt", &config).unwrap().jobs.remove(0);
        let runner = Arc::new(ScriptedRunner::default());
        let executor = JobExecutor::new(
            runner.clone(),
            RunnerConfig::new().with_install_packages(true),
            EventBus::default(),
        );
        executor.execute(&mut job).await;
        assert_eq!(
            runner.commands(),
            vec![
                "apt-get update -qq && apt-get install -y --no-install-recommends libdw-dev",
                "make"
            ]
        );
    }

    #[tokio::test]
    async fn test_exports_reach_later_commands() {
        let mut exports = HashMap::new();
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), "/home/ci/.local/bin:/usr/bin".to_string());
        exports.insert("setup-tools".to_string(), vars);

        let runner = Arc::new(ScriptedRunner {
            exports,
            ..ScriptedRunner::default()
        });
        let mut job = job();
        executor(runner.clone()).execute(&mut job).await;

        let calls = runner.calls.lock().unwrap();
        let (_, build_env) = calls.iter().find(|(c, _)| c == "cargo build").unwrap();
        assert_eq!(build_env.get("PATH").unwrap(), "/home/ci/.local/bin:/usr/bin");
        assert_eq!(build_env.get("TRAVIS_RUST_VERSION").unwrap(), "stable");
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let events = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        events.subscribe(move |event| {
            if let ExecutionEvent::CommandStarted { command, .. } = event {
                sink.lock().unwrap().push(command);
            }
        });

        let runner = Arc::new(ScriptedRunner::default());
        let executor = JobExecutor::new(runner, RunnerConfig::new(), events);
        let mut job = job();
        executor.execute(&mut job).await;

        assert_eq!(seen.lock().unwrap().first().map(String::as_str), Some("setup-tools"));
        assert_eq!(seen.lock().unwrap().last().map(String::as_str), Some("cleanup"));
    }
}
