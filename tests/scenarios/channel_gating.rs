//! Test: Channel Gating - which commands each toolchain channel runs

use crate::helpers::*;
use cirun::core::{ExecutionStatus, PlannedAction};
use cirun::execution::SchedulingStrategy;
use cirun::runner::RunnerConfig;

/// The stable job of the sample descriptor skips the nightly-only commands
#[tokio::test]
async fn test_stable_job_commands() {
    let result = run_yaml(FIXTURE, MockRunner::new()).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(
        result.executed("stable"),
        vec![
            "pip install 'travis-cargo<0.2' --user && export PATH=$HOME/.local/bin:$PATH",
            "travis-cargo build",
            "travis-cargo test",
            "cargo fmt -- --write-mode=diff",
            "travis-cargo --only stable doc",
            "travis-cargo coveralls --no-sudo --verify",
        ]
    );
}

/// The nightly job installs and runs clippy but does not build docs
#[tokio::test]
async fn test_nightly_job_commands() {
    let result = run_yaml(FIXTURE, MockRunner::new()).await;

    assert_eq!(
        result.executed("nightly"),
        vec![
            "pip install 'travis-cargo<0.2' --user && export PATH=$HOME/.local/bin:$PATH",
            r#"if [ "$TRAVIS_RUST_VERSION" == "nightly" ]; then cargo install clippy --force; fi"#,
            "travis-cargo build",
            "travis-cargo test",
            "cargo fmt -- --write-mode=diff",
            "travis-cargo --only nightly clippy",
            "travis-cargo coveralls --no-sudo --verify",
        ]
    );
}

/// Planning agrees with what a run executes
#[tokio::test]
async fn test_plan_matches_execution() {
    let build = build_from_yaml(FIXTURE);
    let plan = build.plan();
    let result = run_build_with(build, MockRunner::new(), SchedulingStrategy::Parallel).await;

    for channel in ["stable", "nightly"] {
        let job_plan = plan.job_for_channel(channel).unwrap();
        let expected: Vec<&str> = job_plan
            .steps
            .iter()
            .filter(|s| {
                matches!(s.action, PlannedAction::Run | PlannedAction::RunOnSuccess)
                    && !s.command.starts_with("apt-get")
            })
            .map(|s| s.command.as_str())
            .collect();
        assert_eq!(result.executed(channel), expected, "channel {}", channel);
    }

    let stable = plan.job_for_channel("stable").unwrap();
    assert!(stable.skipped_commands().contains(&"travis-cargo --only nightly clippy"));
}

/// Structured `only`/`except` entries and dated nightly pins
#[tokio::test]
async fn test_structured_gates_and_dated_pins() {
    let yaml = r#"
language: rust
rust:
  - stable
  - nightly-2018-06-01
script:
  - cargo test
  - run: cargo bench
    only: nightly
  - run: cargo doc
    except: nightly
"#;
    let result = run_yaml(yaml, MockRunner::new()).await;

    assert_eq!(result.executed("stable"), vec!["cargo test", "cargo doc"]);
    assert_eq!(
        result.executed("nightly-2018-06-01"),
        vec!["cargo test", "cargo bench"]
    );
}

/// A gated-out command never reaches the runner
#[tokio::test]
async fn test_gated_commands_are_not_run() {
    let runner = MockRunner::new();
    let result = run_yaml(FIXTURE, runner.clone()).await;

    let stable_calls = result.runner.commands_for("#1 stable");
    assert!(!stable_calls.iter().any(|c| c.contains("clippy")));
    assert!(runner
        .commands_for("#2 nightly")
        .iter()
        .any(|c| c == "travis-cargo --only nightly clippy"));
}

/// With package installation enabled both jobs install the apt packages first
#[tokio::test]
async fn test_package_installation_runs_first() {
    let result = run_build_with_config(
        build_from_yaml(FIXTURE),
        MockRunner::new(),
        SchedulingStrategy::Sequential,
        RunnerConfig::new().with_install_packages(true),
    )
    .await;

    let install = "apt-get update -qq && \
        apt-get install -y --no-install-recommends libcurl4-openssl-dev libelf-dev libdw-dev";
    for channel in ["stable", "nightly"] {
        assert_eq!(result.executed(channel).first(), Some(&install));
    }
    assert!(!result.executed("stable").contains(&"travis-cargo --only nightly clippy"));
    assert!(!result.executed("nightly").contains(&"travis-cargo --only stable doc"));
}
