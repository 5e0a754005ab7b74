//! cirun - run Travis-style CI pipeline descriptors locally

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;

// Re-export commonly used types
pub use self::core::config::CiConfig;
pub use self::core::{Build, BuildPlan, ExecutionStatus, Job, Phase, StepState};
pub use execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
pub use runner::{CommandRunner, RunnerConfig, ShellRunner};
