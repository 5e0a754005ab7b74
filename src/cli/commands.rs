//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Run every job of a descriptor
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the descriptor (e.g. .travis.yml)
    #[arg(short, long)]
    pub file: String,

    /// Only run jobs on these toolchain channels
    #[arg(long)]
    pub channel: Vec<String>,

    /// Variable overrides (KEY=VALUE), applied to every job
    #[arg(long, value_parser = parse_key_value)]
    pub env_override: Vec<(String, String)>,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Sequential)]
    pub strategy: SchedulingStrategyArg,

    /// Concurrent jobs for the parallel-limited strategy
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Don't save the build to history
    #[arg(long)]
    pub no_history: bool,

    /// Run the apt-get step for addons.apt.packages (needs root, or sudo: true)
    #[arg(long)]
    pub install_packages: bool,

    /// Per-command timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory jobs start in (defaults to the current directory)
    #[arg(long)]
    pub workdir: Option<PathBuf>,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(self.max_parallel)
            }
        }
    }
}

/// Show the commands each job would run
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to the descriptor
    #[arg(short, long)]
    pub file: String,

    /// Only plan jobs on these channels
    #[arg(long)]
    pub channel: Vec<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a descriptor
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the descriptor
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Print the descriptor re-serialized as YAML
    #[arg(long)]
    pub emit: bool,
}

/// List descriptors found in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show build counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show build history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Descriptor name to filter by
    #[arg(short, long)]
    pub descriptor: Option<String>,

    /// Number of recent builds to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single build
    #[arg(long)]
    pub build_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Parse KEY=VALUE pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid KEY=VALUE pair: {}", s)),
    }
}
