//! Test: Failure Semantics - fail-fast phases and build status

use crate::helpers::*;
use cirun::core::{ExecutionStatus, Phase, StepState};
use cirun::execution::SchedulingStrategy;

const LIFECYCLE: &str = r#"
language: rust
rust: [stable]
before_install:
  - rustup component add rustfmt
install:
  - cargo fetch
script:
  - cargo build
  - cargo test
  - cargo fmt -- --check
after_success:
  - upload-coverage
after_failure:
  - cat target/debug/build/*/output
after_script:
  - cargo clean
"#;

/// A failing script command prevents after_success and the rest of script
#[tokio::test]
async fn test_script_failure_stops_script_and_skips_after_success() {
    let runner = MockRunner::new().failing("cargo test", 101);
    let result = run_yaml(LIFECYCLE, runner).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_status(&result, "stable", ExecutionStatus::Failed);
    assert_eq!(
        result.executed("stable"),
        vec![
            "rustup component add rustfmt",
            "cargo fetch",
            "cargo build",
            "cargo test",
            "cat target/debug/build/*/output",
            "cargo clean",
        ]
    );

    let job = result.job("stable");
    assert_eq!(job.state.failed_phase, Some(Phase::Script));
    let failed = job
        .steps
        .iter()
        .find(|s| s.command.run == "cargo test")
        .unwrap();
    assert!(matches!(
        failed.state,
        StepState::Failed {
            exit_code: Some(101),
            ..
        }
    ));
}

/// A setup failure errors the job and skips script entirely
#[tokio::test]
async fn test_install_failure_errors_job() {
    let runner = MockRunner::new().failing("cargo fetch", 1);
    let result = run_yaml(LIFECYCLE, runner).await;

    assert_eq!(result.status, ExecutionStatus::Errored);
    assert_job_status(&result, "stable", ExecutionStatus::Errored);
    assert_eq!(
        result.executed("stable"),
        vec!["rustup component add rustfmt", "cargo fetch", "cargo clean"]
    );
    assert!(result
        .job("stable")
        .steps_in(Phase::Script)
        .all(|s| s.state.is_skipped()));
}

/// after_* failures are reported but never change the result
#[tokio::test]
async fn test_after_phase_failures_are_tolerated() {
    let runner = MockRunner::new()
        .failing("upload-coverage", 1)
        .failing("cargo clean", 1);
    let result = run_yaml(LIFECYCLE, runner).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert!(result.executed("stable").contains(&"cargo clean"));
}

/// Running the same build twice gives the same statuses and commands
#[tokio::test]
async fn test_runs_are_idempotent() {
    let runner = MockRunner::new().failing_on("travis-cargo test", "nightly", 1);

    let first = run_yaml(FIXTURE, runner.clone()).await;
    let second = run_yaml(FIXTURE, runner).await;

    assert_eq!(first.status, second.status);
    for channel in ["stable", "nightly"] {
        assert_eq!(first.job(channel).status(), second.job(channel).status());
        assert_eq!(first.executed(channel), second.executed(channel));
    }
    assert_eq!(first.status, ExecutionStatus::Failed);
}

/// A failed required job fails the build whatever the strategy
#[tokio::test]
async fn test_status_is_independent_of_strategy() {
    for strategy in [
        SchedulingStrategy::Sequential,
        SchedulingStrategy::Parallel,
        SchedulingStrategy::LimitedParallel(1),
    ] {
        let runner = MockRunner::new().failing_on("cargo fmt", "stable", 1);
        let result = run_build_with(build_from_yaml(FIXTURE), runner, strategy).await;

        assert_eq!(result.status, ExecutionStatus::Failed, "{:?}", strategy);
        assert_job_status(&result, "stable", ExecutionStatus::Failed);
        assert_job_status(&result, "nightly", ExecutionStatus::Passed);
        assert_eq!(result.build.state.failed_jobs, 1);
        assert_eq!(result.build.state.passed_jobs, 1);
    }
}
