//! Shell commands and their channel gates

use crate::core::config::CommandEntry;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Restricts a command to (or away from) one toolchain channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelGate {
    /// Run only on this channel
    Only(String),
    /// Run on every channel except this one
    Except(String),
}

impl ChannelGate {
    /// Check whether a job on `channel` may run the gated command
    pub fn allows(&self, channel: &str) -> bool {
        match self {
            ChannelGate::Only(gate) => channel_matches(gate, channel),
            ChannelGate::Except(gate) => !channel_matches(gate, channel),
        }
    }

    /// The channel named by the gate
    pub fn channel(&self) -> &str {
        match self {
            ChannelGate::Only(c) | ChannelGate::Except(c) => c,
        }
    }
}

impl fmt::Display for ChannelGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelGate::Only(c) => write!(f, "only on {}", c),
            ChannelGate::Except(c) => write!(f, "not on {}", c),
        }
    }
}

/// `nightly` matches `nightly` and dated pins such as `nightly-2018-01-01`
pub fn channel_matches(gate: &str, channel: &str) -> bool {
    channel == gate
        || channel
            .strip_prefix(gate)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// A single command of a lifecycle phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Shell text, executed verbatim
    pub run: String,

    /// Channel restriction, if any
    pub gate: Option<ChannelGate>,
}

fn travis_cargo_only() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\(?\s*travis-cargo\s+(?:-q\s+)?--only\s+([A-Za-z0-9._-]+)\s")
            .expect("static regex")
    })
}

fn rust_version_test() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^if\s+\[\[?\s+"?\$\{?TRAVIS_RUST_VERSION\}?"?\s+(==|=|!=)\s+"?([A-Za-z0-9._-]+)"?\s+\]\]?\s*;\s*then\s"#,
        )
        .expect("static regex")
    })
}

impl Command {
    /// An ungated shell command
    pub fn shell(run: impl Into<String>) -> Self {
        let run = run.into();
        let gate = Self::detect_gate(&run);
        Self { run, gate }
    }

    /// Build a command from its descriptor entry
    pub fn from_entry(entry: &CommandEntry) -> Self {
        match entry {
            CommandEntry::Shell(run) => Self::shell(run.clone()),
            CommandEntry::Gated { run, only, except } => {
                let gate = match (only, except) {
                    (Some(c), _) => Some(ChannelGate::Only(c.clone())),
                    (None, Some(c)) => Some(ChannelGate::Except(c.clone())),
                    (None, None) => Self::detect_gate(run),
                };
                Self {
                    run: run.clone(),
                    gate,
                }
            }
        }
    }

    /// Recognise channel gates written inline in shell text
    pub fn detect_gate(run: &str) -> Option<ChannelGate> {
        let run = run.trim();

        if let Some(caps) = travis_cargo_only().captures(run) {
            return Some(ChannelGate::Only(caps[1].to_string()));
        }

        if let Some(caps) = rust_version_test().captures(run) {
            let channel = caps[2].to_string();
            return Some(match &caps[1] {
                "!=" => ChannelGate::Except(channel),
                _ => ChannelGate::Only(channel),
            });
        }

        None
    }

    /// Whether a job on `channel` runs this command
    pub fn runs_on(&self, channel: &str) -> bool {
        self.gate.as_ref().map_or(true, |g| g.allows(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_command_has_no_gate() {
        let cmd = Command::shell("cargo build --verbose");
        assert_eq!(cmd.gate, None);
        assert!(cmd.runs_on("stable"));
        assert!(cmd.runs_on("nightly"));
    }

    #[test]
    fn test_travis_cargo_only() {
        let cmd = Command::shell("travis-cargo --only nightly clippy");
        assert_eq!(cmd.gate, Some(ChannelGate::Only("nightly".to_string())));
        assert!(cmd.runs_on("nightly"));
        assert!(!cmd.runs_on("stable"));

        let quiet = Command::shell("(travis-cargo -q --only stable doc)");
        assert_eq!(quiet.gate, Some(ChannelGate::Only("stable".to_string())));
    }

    #[test]
    fn test_rust_version_conditional() {
        let cmd = Command::shell(
            r#"if [ "$TRAVIS_RUST_VERSION" == "nightly" ]; then cargo install clippy --force; fi"#,
        );
        assert_eq!(cmd.gate, Some(ChannelGate::Only("nightly".to_string())));

        let braces = Command::shell(
            r#"if [[ "${TRAVIS_RUST_VERSION}" = stable ]]; then cargo doc; fi"#,
        );
        assert_eq!(braces.gate, Some(ChannelGate::Only("stable".to_string())));

        let negated = Command::shell(
            r#"if [ "$TRAVIS_RUST_VERSION" != "nightly" ]; then cargo doc; fi"#,
        );
        assert_eq!(negated.gate, Some(ChannelGate::Except("nightly".to_string())));
        assert!(negated.runs_on("stable"));
        assert!(!negated.runs_on("nightly"));
    }

    #[test]
    fn test_structured_entry_wins() {
        let entry = CommandEntry::Gated {
            run: "cargo clippy".to_string(),
            only: None,
            except: Some("stable".to_string()),
        };
        let cmd = Command::from_entry(&entry);
        assert_eq!(cmd.gate, Some(ChannelGate::Except("stable".to_string())));
        assert_eq!(cmd.run, "cargo clippy");
    }

    #[test]
    fn test_channel_matches_dated_pins() {
        assert!(channel_matches("nightly", "nightly"));
        assert!(channel_matches("nightly", "nightly-2018-01-01"));
        assert!(!channel_matches("nightly", "nightlyish"));
        assert!(!channel_matches("stable", "nightly"));
        assert!(!channel_matches("1.2", "1.20.0"));
    }

    #[test]
    fn test_gate_display() {
        assert_eq!(ChannelGate::Only("nightly".into()).to_string(), "only on nightly");
        assert_eq!(ChannelGate::Except("beta".into()).to_string(), "not on beta");
    }
}
