//! Live terminal display for streamed builds
//!
//! [`TerminalOutput`] renders execution events as they arrive: a header and
//! separator when a job starts, the command line before it runs, and every
//! output line the command prints. When several jobs run at once each line is
//! prefixed with its job label.

use crate::cli::output::format_execution_event;
use crate::execution::ExecutionEvent;
use crate::runner::OutputStream;
use console::style;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Prints execution events and command output to stdout
#[derive(Debug)]
pub struct TerminalOutput {
    prefix_lines: bool,
    total_jobs: usize,
    started_jobs: AtomicUsize,
}

impl TerminalOutput {
    /// `prefix_lines` should be set when jobs run concurrently
    pub fn new(prefix_lines: bool, total_jobs: usize) -> Self {
        Self {
            prefix_lines,
            total_jobs,
            started_jobs: AtomicUsize::new(0),
        }
    }

    /// Format: `[N/M] #1 stable`
    fn print_job_header(&self, label: &str) {
        let n = self.started_jobs.fetch_add(1, Ordering::SeqCst) + 1;
        self.print_separator();
        println!(
            "[{} / {}] {}",
            style(n).cyan(),
            style(self.total_jobs).dim(),
            style(label).bold()
        );
    }

    fn print_separator(&self) {
        let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }

    /// Render a single command output line
    pub fn format_line(&self, job: &str, stream: OutputStream, line: &str) -> String {
        let line = match stream {
            OutputStream::Stdout => line.to_string(),
            OutputStream::Stderr => style(line).yellow().to_string(),
        };
        if self.prefix_lines {
            format!("{} {}", style(format!("[{}]", job)).dim(), line)
        } else {
            line
        }
    }

    pub fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::JobStarted { job, .. } => self.print_job_header(job),
            ExecutionEvent::CommandStarted { command, .. } if !self.prefix_lines => {
                println!("{} {}", style("$").green().bold(), style(command).bold());
            }
            ExecutionEvent::CommandOutput { job, stream, line } => {
                println!("{}", self.format_line(job, *stream, line));
            }
            other => {
                if let Some(text) = format_execution_event(other) {
                    println!("{}", text);
                }
            }
        }
        let _ = io::stdout().flush();
    }
}
