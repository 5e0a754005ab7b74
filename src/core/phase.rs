//! Job lifecycle phases

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lifecycle phase of a CI job, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// OS package installation from `addons.apt.packages`
    Apt,
    BeforeInstall,
    Install,
    BeforeScript,
    Script,
    AfterSuccess,
    AfterFailure,
    AfterScript,
}

impl Phase {
    /// Every phase, in the order a job walks through them
    pub const ALL: [Phase; 8] = [
        Phase::Apt,
        Phase::BeforeInstall,
        Phase::Install,
        Phase::BeforeScript,
        Phase::Script,
        Phase::AfterSuccess,
        Phase::AfterFailure,
        Phase::AfterScript,
    ];

    /// The descriptor key for this phase
    pub fn key(&self) -> &'static str {
        match self {
            Phase::Apt => "addons.apt",
            Phase::BeforeInstall => "before_install",
            Phase::Install => "install",
            Phase::BeforeScript => "before_script",
            Phase::Script => "script",
            Phase::AfterSuccess => "after_success",
            Phase::AfterFailure => "after_failure",
            Phase::AfterScript => "after_script",
        }
    }

    /// A failure here errors the job instead of failing it
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Phase::Apt | Phase::BeforeInstall | Phase::Install | Phase::BeforeScript
        )
    }

    /// Phases whose failures never change the job result
    pub fn is_after(&self) -> bool {
        matches!(
            self,
            Phase::AfterSuccess | Phase::AfterFailure | Phase::AfterScript
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
