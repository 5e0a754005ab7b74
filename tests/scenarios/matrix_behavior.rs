//! Test: Build Matrix - expansion, allowed failures and fast finish

use crate::helpers::*;
use cirun::core::ExecutionStatus;
use cirun::execution::SchedulingStrategy;
use std::time::{Duration, Instant};

const FEATURE_MATRIX: &str = r#"
language: rust
rust: [stable, beta, nightly]
env:
  global:
    - RUST_BACKTRACE=1
  matrix:
    - FEATURES=""
    - FEATURES="serde"
matrix:
  exclude:
    - rust: beta
      env: FEATURES="serde"
  include:
    - rust: 1.20.0
      env: FEATURES=""
  allow_failures:
    - rust: nightly
script:
  - cargo test --features "$FEATURES"
"#;

#[tokio::test]
async fn test_matrix_expansion() {
    let build = build_from_yaml(FEATURE_MATRIX);
    let labels: Vec<String> = build.jobs.iter().map(|j| j.label()).collect();

    assert_eq!(
        labels,
        vec![
            r#"#1 stable FEATURES="""#,
            r#"#2 stable FEATURES="serde""#,
            r#"#3 beta FEATURES="""#,
            r#"#4 nightly FEATURES="""#,
            r#"#5 nightly FEATURES="serde""#,
            r#"#6 1.20.0 FEATURES="""#,
        ]
    );
    assert_eq!(build.required_jobs().count(), 4);
}

/// Nightly failures are allowed and do not fail the build
#[tokio::test]
async fn test_allowed_failures() {
    let runner = MockRunner::new().failing_on("cargo test", "nightly", 101);
    let result = run_build_with(
        build_from_yaml(FEATURE_MATRIX),
        runner,
        SchedulingStrategy::LimitedParallel(3),
    )
    .await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(result.build.state.failed_jobs, 2);
    assert_eq!(result.build.state.passed_jobs, 4);
}

/// A required job failing still fails the build
#[tokio::test]
async fn test_required_failure_fails_build() {
    let runner = MockRunner::new().failing_on("cargo test", "1.20.0", 101);
    let result = run_yaml(FEATURE_MATRIX, runner).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
}

/// With fast_finish the build settles once required jobs are done
#[tokio::test]
async fn test_fast_finish() {
    let yaml = r#"
rust: [stable, nightly]
matrix:
  fast_finish: true
  allow_failures:
    - rust: nightly
script: [cargo test]
"#;
    let runner = MockRunner::new();
    let result = run_yaml(yaml, runner.clone()).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_job_status(&result, "nightly", ExecutionStatus::Cancelled);
    assert!(runner.commands_for("#2 nightly").is_empty());
    assert_eq!(result.build.state.cancelled_jobs, 1);
}

/// In parallel, fast_finish aborts an allowed failure that is still running
#[tokio::test]
async fn test_fast_finish_aborts_running_job_in_parallel() {
    let yaml = r#"
rust: [stable, nightly]
matrix:
  fast_finish: true
  allow_failures:
    - rust: nightly
script: [cargo test]
after_success: [cargo doc]
after_failure: [cat target/log]
after_script: [cargo clean]
"#;
    let runner = MockRunner::new()
        .slow_on("stable", Duration::from_millis(200))
        .slow_on("nightly", Duration::from_secs(30));
    let started = Instant::now();
    let result = run_build_with(
        build_from_yaml(yaml),
        runner.clone(),
        SchedulingStrategy::Parallel,
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_job_status(&result, "stable", ExecutionStatus::Passed);
    assert_job_status(&result, "nightly", ExecutionStatus::Cancelled);
    assert_eq!(result.build.state.cancelled_jobs, 1);

    assert_eq!(runner.commands_for("#2 nightly"), vec!["cargo test"]);
    assert!(result.executed("nightly").is_empty());
    assert_eq!(
        runner.commands_for("#1 stable"),
        vec!["cargo test", "cargo doc", "cargo clean"]
    );
}

/// Restricting a run to some channels drops the other jobs
#[tokio::test]
async fn test_channel_selection() {
    let mut build = build_from_yaml(FIXTURE);
    build.retain_channels(&["nightly".to_string()]);
    assert_eq!(build.jobs.len(), 1);

    let runner = MockRunner::new();
    let result = run_build_with(build, runner.clone(), SchedulingStrategy::Sequential).await;
    assert_eq!(result.status, ExecutionStatus::Passed);
    assert!(runner.calls().iter().all(|c| c.job.starts_with("#2 nightly")));
}
