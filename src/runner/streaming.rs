//! Line streaming from running commands
//!
//! A [`CommandRunner`](crate::runner::CommandRunner) hands every line a
//! command prints to an optional [`OutputSink`] as soon as it is read, so
//! callers can display long-running builds live.
//!
//! # Example
//!
//! ```
//! use cirun::runner::{OutputSink, OutputStream};
//!
//! struct Prefixed;
//!
//! impl OutputSink for Prefixed {
//!     fn on_line(&self, job: &str, _stream: OutputStream, line: &str) {
//!         println!("[{}] {}", job, line);
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Which stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives command output line by line
///
/// This trait is object-safe and can be used as `&dyn OutputSink`.
pub trait OutputSink: Send + Sync {
    /// Called for each line, without its trailing newline
    fn on_line(&self, job: &str, stream: OutputStream, line: &str);
}

/// Sink that drops everything
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl OutputSink for NoopSink {
    fn on_line(&self, _job: &str, _stream: OutputStream, _line: &str) {}
}
