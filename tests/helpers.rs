//! Test utility functions for cirun
#![allow(dead_code)]

use async_trait::async_trait;
use cirun::core::config::CiConfig;
use cirun::core::{Build, ExecutionStatus, Job};
use cirun::execution::{ExecutionEngine, SchedulingStrategy};
use cirun::runner::{CommandOutcome, CommandRunner, Invocation, OutputSink, RunnerConfig, RunnerError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FIXTURE: &str = include_str!("fixtures/travis.yml");

/// A command the mock runner was asked to run
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub job: String,
    pub command: String,
    pub env: HashMap<String, String>,
}

/// Mock runner that records every command and answers with scripted exit codes
#[derive(Clone, Default)]
pub struct MockRunner {
    /// (command fragment, channel or None for any) -> exit code
    failures: Arc<Vec<(String, Option<String>, i32)>>,
    /// channel -> time every command takes
    delays: Arc<Vec<(String, Duration)>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `fragment` exit with `code` on every channel
    pub fn failing(mut self, fragment: &str, code: i32) -> Self {
        Arc::make_mut(&mut self.failures).push((fragment.to_string(), None, code));
        self
    }

    /// Commands containing `fragment` exit with `code` on `channel` only
    pub fn failing_on(mut self, fragment: &str, channel: &str, code: i32) -> Self {
        Arc::make_mut(&mut self.failures).push((
            fragment.to_string(),
            Some(channel.to_string()),
            code,
        ));
        self
    }

    /// Every command on `channel` takes `delay` to finish
    pub fn slow_on(mut self, channel: &str, delay: Duration) -> Self {
        Arc::make_mut(&mut self.delays).push((channel.to_string(), delay));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands run by the job whose label starts with `prefix`, in order
    pub fn commands_for(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.job.starts_with(prefix))
            .map(|c| c.command)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutcome, RunnerError> {
        self.calls.lock().unwrap().push(RecordedCall {
            job: invocation.job.clone(),
            command: invocation.command.clone(),
            env: invocation.env.clone(),
        });

        let channel = invocation.env.get("TRAVIS_RUST_VERSION").cloned();
        let code = self
            .failures
            .iter()
            .find(|(fragment, on, _)| {
                invocation.command.contains(fragment.as_str())
                    && on.as_ref().map_or(true, |c| Some(c) == channel.as_ref())
            })
            .map(|(_, _, code)| *code)
            .unwrap_or(0);

        if let Some((_, delay)) = self
            .delays
            .iter()
            .find(|(on, _)| Some(on) == channel.as_ref())
        {
            tokio::time::sleep(*delay).await;
        }

        if let Some(sink) = sink {
            sink.on_line(
                &invocation.job,
                cirun::runner::OutputStream::Stdout,
                &format!("ran: {}", invocation.command),
            );
        }

        Ok(CommandOutcome::new(code, format!("ran: {}\n", invocation.command)))
    }
}

/// Result of running a build against the mock runner
pub struct BuildTestResult {
    pub build: Build,
    pub status: ExecutionStatus,
    pub runner: MockRunner,
}

impl BuildTestResult {
    pub fn job(&self, channel: &str) -> &Job {
        self.build
            .jobs
            .iter()
            .find(|j| j.channel == channel)
            .unwrap_or_else(|| panic!("no job on channel {}", channel))
    }

    pub fn executed(&self, channel: &str) -> Vec<&str> {
        self.job(channel).executed_commands()
    }
}

pub fn build_from_yaml(yaml: &str) -> Build {
    let config = CiConfig::from_yaml(yaml).expect("descriptor should parse");
    Build::from_config("test.yml", &config).expect("matrix should resolve")
}

/// Run a build to completion with the given runner
pub async fn run_build_with(
    build: Build,
    runner: MockRunner,
    strategy: SchedulingStrategy,
) -> BuildTestResult {
    run_build_with_config(build, runner, strategy, RunnerConfig::new()).await
}

pub async fn run_build_with_config(
    mut build: Build,
    runner: MockRunner,
    strategy: SchedulingStrategy,
    config: RunnerConfig,
) -> BuildTestResult {
    let engine = ExecutionEngine::new(runner.clone(), config, strategy);
    let status = engine.execute(&mut build).await.expect("build should run");
    BuildTestResult {
        build,
        status,
        runner,
    }
}

pub async fn run_yaml(yaml: &str, runner: MockRunner) -> BuildTestResult {
    run_build_with(build_from_yaml(yaml), runner, SchedulingStrategy::Sequential).await
}

pub fn assert_job_status(result: &BuildTestResult, channel: &str, expected: ExecutionStatus) {
    let actual = result.job(channel).status();
    assert_eq!(
        actual, expected,
        "job on {} should be {:?}, ran: {:?}",
        channel,
        expected,
        result.executed(channel)
    );
}
