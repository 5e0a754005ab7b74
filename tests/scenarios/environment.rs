//! Test: Job Environment - built-in variables, declared env and overrides

use crate::helpers::*;
use cirun::execution::SchedulingStrategy;

#[tokio::test]
async fn test_builtin_variables() {
    let runner = MockRunner::new();
    run_yaml(FIXTURE, runner.clone()).await;

    let call = runner
        .calls()
        .into_iter()
        .find(|c| c.job.starts_with("#2") && c.command == "travis-cargo build")
        .unwrap();
    assert_eq!(call.env.get("TRAVIS").map(String::as_str), Some("true"));
    assert_eq!(call.env.get("CI").map(String::as_str), Some("true"));
    assert_eq!(call.env.get("TRAVIS_RUST_VERSION").map(String::as_str), Some("nightly"));
    assert_eq!(call.env.get("TRAVIS_JOB_NUMBER").map(String::as_str), Some("2"));
    assert_eq!(call.env.get("RUSTFLAGS").map(String::as_str), Some("-D warnings"));
}

#[tokio::test]
async fn test_matrix_env_and_overrides() {
    let yaml = r#"
rust: [stable]
env:
  global:
    - TARGET_DIR=target
  matrix:
    - FEATURES=a OUT=$TARGET_DIR/a
    - FEATURES=b OUT='$TARGET_DIR/b'
script: [make]
"#;
    let mut build = build_from_yaml(yaml);
    build.override_variable("TARGET_DIR", "/tmp/ci");

    let runner = MockRunner::new();
    run_build_with(build, runner.clone(), SchedulingStrategy::Sequential).await;

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);

    let first = &calls[0].env;
    assert_eq!(first.get("FEATURES").map(String::as_str), Some("a"));
    assert_eq!(first.get("OUT").map(String::as_str), Some("target/a"));
    assert_eq!(first.get("TARGET_DIR").map(String::as_str), Some("/tmp/ci"));

    let second = &calls[1].env;
    assert_eq!(second.get("OUT").map(String::as_str), Some("$TARGET_DIR/b"));
}
