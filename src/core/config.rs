//! CI descriptor loaded from YAML

use crate::core::{matrix::parse_assignments, Phase};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Channel used when the descriptor has no `rust` key
pub const DEFAULT_CHANNEL: &str = "stable";

/// Top-level CI descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CiConfig {
    /// Elevated privileges for the run environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo: Option<Sudo>,

    /// Toolchain family to provision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Dependency caches persisted across runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addons: Option<AddonsConfig>,

    /// Toolchain channels (matrix axis)
    #[serde(
        default,
        deserialize_with = "one_or_many::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub rust: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvConfig>,

    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
    pub before_install: Option<Vec<CommandEntry>>,

    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
    pub install: Option<Vec<CommandEntry>>,

    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
    pub before_script: Option<Vec<CommandEntry>>,

    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
    pub script: Option<Vec<CommandEntry>>,

    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
    pub after_success: Option<Vec<CommandEntry>>,

    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
    pub after_failure: Option<Vec<CommandEntry>>,

    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
    pub after_script: Option<Vec<CommandEntry>>,

    /// Matrix refinements (`jobs` is accepted as an alias)
    #[serde(default, alias = "jobs", skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixConfig>,

    /// Keys the runner does not interpret, kept for re-serialisation
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `sudo: false`, `sudo: required`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sudo {
    Flag(bool),
    Mode(String),
}

impl Sudo {
    pub fn is_enabled(&self) -> bool {
        match self {
            Sudo::Flag(flag) => *flag,
            Sudo::Mode(mode) => matches!(mode.as_str(), "required" | "enabled" | "true"),
        }
    }
}

/// `cache: cargo`, `cache: [cargo, pip]`, `cache: {directories: [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheConfig {
    Flag(bool),
    Named(String),
    List(Vec<String>),
    Detailed(BTreeMap<String, Value>),
}

impl CacheConfig {
    /// Names of the configured caches
    pub fn names(&self) -> Vec<String> {
        match self {
            CacheConfig::Flag(_) => Vec::new(),
            CacheConfig::Named(name) => vec![name.clone()],
            CacheConfig::List(names) => names.clone(),
            CacheConfig::Detailed(map) => map
                .iter()
                .filter(|(_, v)| !matches!(v, Value::Bool(false)))
                .map(|(k, _)| k.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apt: Option<AptAddon>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AptAddon {
    /// OS packages installed before the scripts run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Environment assignments, either a bare matrix list or `{global, matrix}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvConfig {
    List(Vec<String>),
    Single(String),
    Detailed {
        #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
        global: Option<Vec<String>>,
        #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Option::is_none")]
        matrix: Option<Vec<String>>,
    },
}

impl EnvConfig {
    /// Assignments applied to every job
    pub fn global(&self) -> &[String] {
        match self {
            EnvConfig::Detailed { global: Some(g), .. } => g,
            _ => &[],
        }
    }

    /// Assignments that each form their own matrix cell
    pub fn matrix(&self) -> &[String] {
        match self {
            EnvConfig::List(entries) => entries,
            EnvConfig::Single(entry) => std::slice::from_ref(entry),
            EnvConfig::Detailed { matrix: Some(m), .. } => m,
            EnvConfig::Detailed { .. } => &[],
        }
    }
}

/// A phase entry: a shell string or `{run, only|except}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandEntry {
    Shell(String),
    Gated {
        run: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        only: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        except: Option<String>,
    },
}

impl CommandEntry {
    pub fn run(&self) -> &str {
        match self {
            CommandEntry::Shell(run) | CommandEntry::Gated { run, .. } => run,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Extra cells appended to the cross product
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<MatrixEntry>,

    /// Cells removed from the cross product
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<MatrixEntry>,

    /// Cells whose failure does not fail the build
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_failures: Vec<MatrixEntry>,

    /// Settle the build once every required job finished
    #[serde(default, skip_serializing_if = "is_false")]
    pub fast_finish: bool,
}

/// Selects matrix cells by channel and/or matrix env entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rust: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    /// Keys such as `os` or per-entry `script`; kept for round-trips only
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MatrixEntry {
    /// Every key present must match; an empty entry matches nothing
    pub fn matches(&self, channel: &str, env: Option<&str>) -> bool {
        if self.rust.is_none() && self.env.is_none() {
            return false;
        }
        let rust_ok = self.rust.as_deref().map_or(true, |r| r == channel);
        let env_ok = self.env.as_deref().map_or(true, |e| Some(e) == env);
        rust_ok && env_ok
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Accept either a scalar or a list where the platform does
mod one_or_many {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let value = Option::<OneOrMany<T>>::deserialize(deserializer)?;
        Ok(value.map(|v| match v {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }))
    }
}

impl CiConfig {
    /// Load a descriptor from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a descriptor from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CiConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialise the descriptor back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the descriptor
    pub fn validate(&self) -> Result<()> {
        if let Some(channels) = &self.rust {
            if channels.is_empty() {
                anyhow::bail!("'rust' lists no toolchain channels");
            }
            for channel in channels {
                if channel.trim().is_empty() {
                    anyhow::bail!("'rust' contains an empty channel name");
                }
            }
        }

        for phase in Phase::ALL {
            for entry in self.phase_entries(phase) {
                if entry.run().trim().is_empty() {
                    anyhow::bail!("Phase '{}' contains an empty command", phase);
                }
                if let CommandEntry::Gated {
                    only: Some(_),
                    except: Some(_),
                    ..
                } = entry
                {
                    anyhow::bail!(
                        "Command '{}' in '{}' sets both 'only' and 'except'",
                        entry.run(),
                        phase
                    );
                }
            }
        }

        if let Some(env) = &self.env {
            for assignment in env.global().iter().chain(env.matrix()) {
                parse_assignments(assignment)?;
            }
        }

        if let Some(matrix) = &self.matrix {
            let mut channels = self.channels();
            channels.extend(matrix.include.iter().filter_map(|e| e.rust.clone()));

            let named = matrix
                .exclude
                .iter()
                .map(|e| ("exclude", e))
                .chain(matrix.allow_failures.iter().map(|e| ("allow_failures", e)));
            for (key, entry) in named {
                if entry.rust.is_none() && entry.env.is_none() {
                    anyhow::bail!("matrix.{} has an entry without 'rust' or 'env'", key);
                }
                if let Some(rust) = &entry.rust {
                    if !channels.contains(rust) {
                        anyhow::bail!(
                            "matrix.{} references channel '{}' which is not in 'rust' or 'matrix.include'",
                            key,
                            rust
                        );
                    }
                }
            }
            for entry in &matrix.include {
                if let Some(env) = &entry.env {
                    parse_assignments(env)?;
                }
            }

            let all = matrix
                .include
                .iter()
                .map(|e| ("include", e))
                .chain(matrix.exclude.iter().map(|e| ("exclude", e)))
                .chain(matrix.allow_failures.iter().map(|e| ("allow_failures", e)));
            for (key, entry) in all {
                for extra in entry.extra.keys() {
                    warn!("Ignoring unsupported key '{}' in matrix.{}", extra, key);
                }
            }
        }

        for key in self.extra.keys() {
            warn!("Ignoring unsupported descriptor key '{}'", key);
        }

        Ok(())
    }

    /// Toolchain channels forming the matrix axis
    pub fn channels(&self) -> Vec<String> {
        match &self.rust {
            Some(channels) => channels.clone(),
            None => vec![DEFAULT_CHANNEL.to_string()],
        }
    }

    pub fn is_rust(&self) -> bool {
        self.language.as_deref() == Some("rust")
    }

    /// OS packages requested through `addons.apt.packages`
    pub fn apt_packages(&self) -> &[String] {
        self.addons
            .as_ref()
            .and_then(|a| a.apt.as_ref())
            .map(|apt| apt.packages.as_slice())
            .unwrap_or(&[])
    }

    pub fn requires_sudo(&self) -> bool {
        self.sudo.as_ref().is_some_and(Sudo::is_enabled)
    }

    pub fn fast_finish(&self) -> bool {
        self.matrix.as_ref().is_some_and(|m| m.fast_finish)
    }

    /// Raw entries declared for a phase (the synthetic apt phase has none)
    pub fn phase_entries(&self, phase: Phase) -> &[CommandEntry] {
        let entries = match phase {
            Phase::Apt => None,
            Phase::BeforeInstall => self.before_install.as_ref(),
            Phase::Install => self.install.as_ref(),
            Phase::BeforeScript => self.before_script.as_ref(),
            Phase::Script => self.script.as_ref(),
            Phase::AfterSuccess => self.after_success.as_ref(),
            Phase::AfterFailure => self.after_failure.as_ref(),
            Phase::AfterScript => self.after_script.as_ref(),
        };
        entries.map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entries for a phase, with the Rust default script filled in
    pub fn effective_entries(&self, phase: Phase) -> Vec<CommandEntry> {
        if phase == Phase::Script && self.script.is_none() && self.is_rust() {
            return vec![
                CommandEntry::Shell("cargo build --verbose".to_string()),
                CommandEntry::Shell("cargo test --verbose".to_string()),
            ];
        }
        self.phase_entries(phase).to_vec()
    }
}
