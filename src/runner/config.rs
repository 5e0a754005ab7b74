//! Runner configuration

use std::path::PathBuf;

/// Default per-command timeout, the hosted platform's 50 minute job limit
pub const DEFAULT_TIMEOUT_SECS: u64 = 3000;

/// Configuration for the command runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Shell used to interpret commands
    ///
    /// If not provided, `bash` is used when it is on PATH, otherwise `sh`.
    pub shell: Option<String>,

    /// Timeout for a single command in seconds
    pub timeout_secs: u64,

    /// Directory jobs start in (defaults to the current directory)
    pub working_dir: Option<PathBuf>,

    /// Actually install `addons.apt.packages` instead of skipping them
    pub install_packages: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            working_dir: None,
            install_packages: false,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_install_packages(mut self, install: bool) -> Self {
        self.install_packages = install;
        self
    }

    /// The shell to spawn
    pub fn resolve_shell(&self) -> String {
        if let Some(shell) = &self.shell {
            return shell.clone();
        }
        if on_path("bash") {
            "bash".to_string()
        } else {
            "sh".to_string()
        }
    }

    /// The directory a job starts in
    pub fn resolve_working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
