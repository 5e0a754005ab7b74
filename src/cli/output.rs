//! CLI output formatting

use crate::{
    core::{BuildPlan, ExecutionStatus, Job, PlannedAction, StepState},
    execution::ExecutionEvent,
    persistence::BuildSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub use console::style;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar over `total` jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Passed { .. } => style("PASSED").green().to_string(),
        StepState::Failed { exit_code: Some(code), .. } => {
            style(format!("FAILED ({})", code)).red().to_string()
        }
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Passed => style("PASSED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Errored => style("ERRORED").red().bold().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Passed => CHECK,
        ExecutionStatus::Failed | ExecutionStatus::Errored => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Cancelled => SKIP,
        ExecutionStatus::Pending => INFO,
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a history entry for display
pub fn format_build_summary(summary: &BuildSummary) -> String {
    format!(
        "{} {} - {} - {} - {}/{} passed - {}",
        status_icon(summary.status),
        style(short_id(&summary.build_id)).dim(),
        style(&summary.descriptor).bold(),
        format_status(summary.status),
        summary.passed_jobs,
        summary.total_jobs,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// One result line per job
pub fn format_job_result(job: &Job) -> String {
    let mut line = format!(
        "{} {} {}",
        status_icon(job.status()),
        style(job.label()).bold(),
        format_status(job.status())
    );
    if let Some(phase) = job.state.failed_phase {
        line.push_str(&format!(" in {}", style(phase).cyan()));
    }
    if job.allow_failure {
        line.push_str(&format!(" {}", style("(allowed to fail)").dim()));
    }
    line
}

/// Format an execution event for display
///
/// Output lines are rendered by the terminal streamer, not here.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let text = match event {
        ExecutionEvent::BuildStarted {
            build_id,
            name,
            total_jobs,
        } => format!(
            "{} Starting build {} ({}) with {} job(s)",
            ROCKET,
            style(name).bold(),
            style(short_id(build_id)).dim(),
            total_jobs
        ),
        ExecutionEvent::JobStarted { job, .. } => {
            format!("{} {}", SPINNER, style(job).cyan())
        }
        ExecutionEvent::PhaseStarted { .. } | ExecutionEvent::CommandOutput { .. } => return None,
        ExecutionEvent::CommandStarted { job, command, .. } => {
            format!("  {} {}", style(format!("[{}] $", job)).dim(), command)
        }
        ExecutionEvent::CommandFinished {
            job,
            command,
            exit_code,
            duration_ms,
            ..
        } => {
            if *exit_code == 0 {
                return None;
            }
            format!(
                "  {} [{}] {} exited with {} after {}",
                CROSS,
                job,
                style(command).red(),
                exit_code,
                format_duration(Duration::from_millis(*duration_ms))
            )
        }
        ExecutionEvent::CommandFailed {
            job,
            command,
            error,
            ..
        } => format!(
            "  {} [{}] {}: {}",
            CROSS,
            job,
            style(command).red(),
            style(error).dim()
        ),
        ExecutionEvent::CommandSkipped {
            job,
            command,
            reason,
            ..
        } => format!(
            "  {} {} {}",
            style(format!("[{}] skipped", job)).dim(),
            command,
            style(format!("({})", reason)).dim()
        ),
        ExecutionEvent::JobFinished {
            job,
            status,
            allow_failure,
            ..
        } => {
            let allowed = if *allow_failure && *status != ExecutionStatus::Passed {
                style(" (allowed to fail)").dim().to_string()
            } else {
                String::new()
            };
            format!(
                "{} {} {}{}",
                status_icon(*status),
                style(job).bold(),
                format_status(*status),
                allowed
            )
        }
        ExecutionEvent::BuildFinished { build_id, status } => format!(
            "{} Build ({}) {}",
            INFO,
            style(short_id(build_id)).dim(),
            format_status(*status)
        ),
    };
    Some(text)
}

/// Render a dry-run plan
pub fn format_plan(plan: &BuildPlan) -> String {
    let mut out = format!("{} Plan for {}\n", INFO, style(&plan.name).bold());
    if plan.fast_finish {
        out.push_str(&format!("  {}\n", style("fast_finish enabled").dim()));
    }

    for job in &plan.jobs {
        let env = job.env.as_deref().unwrap_or("");
        let allowed = if job.allow_failure {
            style(" (allowed to fail)").dim().to_string()
        } else {
            String::new()
        };
        out.push_str(&format!(
            "\n{} {} {}{}\n",
            style(format!("#{}", job.number)).cyan(),
            style(&job.channel).bold(),
            env,
            allowed
        ));

        for step in &job.steps {
            let marker = match &step.action {
                PlannedAction::Run => style("run").green().to_string(),
                PlannedAction::RunOnSuccess => style("on success").green().dim().to_string(),
                PlannedAction::RunOnFailure => style("on failure").yellow().dim().to_string(),
                PlannedAction::Skip(reason) => style(format!("skip: {}", reason)).dim().to_string(),
            };
            out.push_str(&format!(
                "  {:<14} {}  {}\n",
                step.phase.to_string(),
                step.command,
                marker
            ));
        }
    }
    out
}

/// Format command output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            truncated
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{}s", secs, duration.subsec_millis() / 100)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
