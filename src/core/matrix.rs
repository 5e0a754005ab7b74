//! Build matrix resolution

use crate::core::config::{CiConfig, DEFAULT_CHANNEL};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A single `KEY=value` environment assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,

    /// Single-quoted values are taken literally, others get `$VAR` expansion
    #[serde(default)]
    pub literal: bool,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            literal: false,
        }
    }

    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            literal: true,
            ..Self::new(name, value)
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse `KEY=value KEY2="quoted value" KEY3='literal'`
pub fn parse_assignments(input: &str) -> Result<Vec<EnvVar>> {
    let mut vars = Vec::new();
    let mut chars = input.trim().chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            name.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            anyhow::bail!("Invalid env assignment '{}': expected KEY=value", input);
        }
        if !is_valid_name(&name) {
            anyhow::bail!("Invalid env variable name '{}' in '{}'", name, input);
        }

        let mut value = String::new();
        let mut literal = false;
        let mut quote: Option<char> = None;
        while let Some(&c) = chars.peek() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => value.push(c),
                None if c == '"' || c == '\'' => {
                    literal |= c == '\'';
                    quote = Some(c);
                }
                None if c.is_whitespace() => break,
                None => value.push(c),
            }
            chars.next();
        }
        if quote.is_some() {
            anyhow::bail!("Unterminated quote in env assignment '{}'", input);
        }

        vars.push(EnvVar {
            name,
            value,
            literal,
        });
    }

    if vars.is_empty() {
        anyhow::bail!("Empty env assignment");
    }

    Ok(vars)
}

/// One resolved combination of channel and environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    /// 1-based job number within the build
    pub number: usize,

    /// Toolchain channel
    pub channel: String,

    /// The `env.matrix` entry this cell was built from, verbatim
    pub env_entry: Option<String>,

    /// `env.global` followed by the matrix entry
    pub env: Vec<EnvVar>,

    /// Failure of this cell does not fail the build
    pub allow_failure: bool,
}

/// All cells of a build, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMatrix {
    pub cells: Vec<MatrixCell>,
    pub fast_finish: bool,
}

impl BuildMatrix {
    /// Expand the descriptor's channel and env axes into cells
    pub fn resolve(config: &CiConfig) -> Result<Self> {
        let channels = config.channels();

        let (global, matrix_envs) = match &config.env {
            Some(env) => (env.global().to_vec(), env.matrix().to_vec()),
            None => (Vec::new(), Vec::new()),
        };

        let mut global_vars = Vec::new();
        for assignment in &global {
            global_vars.extend(parse_assignments(assignment)?);
        }

        let env_axis: Vec<Option<String>> = if matrix_envs.is_empty() {
            vec![None]
        } else {
            matrix_envs.into_iter().map(Some).collect()
        };

        let refinements = config.matrix.clone().unwrap_or_default();

        let mut combos: Vec<(String, Option<String>)> = Vec::new();
        for channel in &channels {
            for env in &env_axis {
                let excluded = refinements
                    .exclude
                    .iter()
                    .any(|e| e.matches(channel, env.as_deref()));
                if !excluded {
                    combos.push((channel.clone(), env.clone()));
                }
            }
        }

        for include in &refinements.include {
            let channel = include.rust.clone().unwrap_or_else(|| {
                channels
                    .first()
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
            });
            combos.push((channel, include.env.clone()));
        }

        let mut cells = Vec::with_capacity(combos.len());
        for (index, (channel, env_entry)) in combos.into_iter().enumerate() {
            let mut env = global_vars.clone();
            if let Some(entry) = &env_entry {
                env.extend(parse_assignments(entry)?);
            }

            let allow_failure = refinements
                .allow_failures
                .iter()
                .any(|e| e.matches(&channel, env_entry.as_deref()));

            cells.push(MatrixCell {
                number: index + 1,
                channel,
                env_entry,
                env,
                allow_failure,
            });
        }

        Ok(Self {
            cells,
            fast_finish: refinements.fast_finish,
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
