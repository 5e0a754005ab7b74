//! Job context - the shell environment a job's commands run in

use crate::core::matrix::{EnvVar, MatrixCell};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Variables the runner exports itself; they survive user overrides
const CI_MARKERS: [(&str, &str); 2] = [("TRAVIS", "true"), ("CI", "true")];

/// Shell bookkeeping variables never carried between commands
const VOLATILE: [&str; 4] = ["_", "SHLVL", "OLDPWD", "PWD"];

/// Environment and working directory shared by the commands of one job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobContext {
    /// Variables set by the runner (`TRAVIS_RUST_VERSION`, ...)
    pub builtins: Vec<EnvVar>,

    /// `env.global` and matrix assignments, in declaration order
    pub declared: Vec<EnvVar>,

    /// Command-line overrides, applied after declared variables
    pub overrides: Vec<EnvVar>,

    /// Variables exported by earlier commands of this job
    pub exported: HashMap<String, String>,

    /// Directory the next command starts in (follows `cd`)
    pub working_dir: Option<PathBuf>,
}

fn variable_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("static regex")
    })
}

impl JobContext {
    /// Context for a matrix cell
    pub fn for_cell(cell: &MatrixCell) -> Self {
        let mut builtins: Vec<EnvVar> = CI_MARKERS
            .iter()
            .map(|(k, v)| EnvVar::literal(*k, *v))
            .collect();
        builtins.push(EnvVar::literal("TRAVIS_RUST_VERSION", cell.channel.clone()));
        builtins.push(EnvVar::literal("TRAVIS_JOB_NUMBER", cell.number.to_string()));
        builtins.push(EnvVar::literal(
            "TRAVIS_ALLOW_FAILURE",
            cell.allow_failure.to_string(),
        ));

        Self {
            builtins,
            declared: cell.env.clone(),
            ..Self::default()
        }
    }

    /// Add a command-line override
    pub fn set_override(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.overrides.push(EnvVar::literal(name, value));
    }

    /// Fold in the variables a command left exported
    pub fn apply_exports(&mut self, exported: HashMap<String, String>) {
        for (name, value) in exported {
            if name == "PWD" {
                self.working_dir = Some(PathBuf::from(value));
            } else if !VOLATILE.contains(&name.as_str()) {
                self.exported.insert(name, value);
            }
        }
    }

    /// Resolve the environment for the next command
    ///
    /// `inherited` looks up variables of the runner's own process and is
    /// consulted when expanding `$VAR` references that the job itself does
    /// not define.
    pub fn environment_with<F>(&self, inherited: F) -> HashMap<String, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env: HashMap<String, String> = HashMap::new();

        for var in self.builtins.iter().chain(&self.declared) {
            let value = if var.literal {
                var.value.clone()
            } else {
                expand(&var.value, &env, &inherited)
            };
            env.insert(var.name.clone(), value);
        }

        env.extend(self.exported.clone());

        for var in &self.overrides {
            env.insert(var.name.clone(), var.value.clone());
        }

        env
    }

    /// Resolve the environment against the current process
    pub fn environment(&self) -> HashMap<String, String> {
        self.environment_with(|name| std::env::var(name).ok())
    }

    /// Look up a resolved variable without consulting the process
    pub fn get_variable(&self, name: &str) -> Option<String> {
        self.environment_with(|_| None).remove(name)
    }
}

fn expand<F>(value: &str, env: &HashMap<String, String>, inherited: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    variable_reference()
        .replace_all(value, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            env.get(name)
                .cloned()
                .or_else(|| inherited(name))
                .unwrap_or_default()
        })
        .into_owned()
}
