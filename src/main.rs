use anyhow::{Context, Result};
use cirun::cli::commands::{HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand};
use cirun::cli::output::*;
use cirun::cli::terminal_output::TerminalOutput;
use cirun::cli::{Cli, Command};
use cirun::core::config::CiConfig;
use cirun::core::matrix::BuildMatrix;
use cirun::core::{Build, ExecutionStatus, Phase};
use cirun::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use cirun::persistence::{create_summary, BuildSummary, InMemoryPersistence, PersistenceBackend};
use cirun::runner::{RunnerConfig, ShellRunner};
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let passed = match &cli.command {
        Command::Run(cmd) => run_build(cmd, cli.stream).await?,
        Command::Plan(cmd) => plan_build(cmd)?,
        Command::Validate(cmd) => validate_descriptor(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::List(cmd) => list_descriptors(cmd).await?,
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

/// Open the build history store
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        let store = cirun::persistence::SqliteBuildStore::with_default_path().await?;
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        tracing::warn!("Built without sqlite support, history is not kept");
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

/// Load a descriptor and resolve its build
fn load_build(file: &str, channels: &[String]) -> Result<Build> {
    let config = CiConfig::from_file(file)
        .with_context(|| format!("Failed to load descriptor {}", file))?;
    let mut build = Build::from_config(file, &config)?;

    build.retain_channels(channels);
    if build.jobs.is_empty() {
        anyhow::bail!("No job runs on channel(s): {}", channels.join(", "));
    }
    Ok(build)
}

async fn run_build(cmd: &RunCommand, stream: bool) -> Result<bool> {
    let mut build = load_build(&cmd.file, &cmd.channel)?;
    println!(
        "{} Loaded {}: {} job(s)",
        INFO,
        style(&build.name).bold(),
        style(build.jobs.len()).cyan()
    );

    for (key, value) in &cmd.env_override {
        build.override_variable(key, value);
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };

    let mut runner_config = RunnerConfig::new().with_install_packages(cmd.install_packages);
    if let Some(timeout) = cmd.timeout {
        runner_config = runner_config.with_timeout(timeout);
    }
    if let Some(dir) = &cmd.workdir {
        runner_config = runner_config.with_working_dir(dir);
    }

    let strategy = cmd.scheduling_strategy();
    let runner = ShellRunner::new(&runner_config);
    let engine = ExecutionEngine::new(runner, runner_config, strategy);

    let progress = if stream {
        let terminal = TerminalOutput::new(
            strategy != SchedulingStrategy::Sequential,
            build.jobs.len(),
        );
        engine.add_event_handler(move |event| terminal.on_event(&event));
        None
    } else {
        let progress = create_progress_bar(build.jobs.len());
        let bar = progress.clone();
        engine.add_event_handler(move |event| {
            match event {
                ExecutionEvent::JobFinished { .. } => bar.inc(1),
                ExecutionEvent::CommandOutput { .. } | ExecutionEvent::CommandStarted { .. } => {
                    return
                }
                _ => {}
            }
            if let Some(text) = format_execution_event(&event) {
                bar.println(text);
            }
        });
        Some(progress)
    };

    println!();
    let status = tokio::select! {
        status = engine.execute(&mut build) => status?,
        _ = tokio::signal::ctrl_c() => {
            if let Some(progress) = &progress {
                progress.abandon();
            }
            anyhow::bail!("Interrupted; running commands were killed");
        }
    };
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    println!("\n{} Results:", INFO);
    for job in &build.jobs {
        println!("  {}", format_job_result(job));
        if !stream {
            print_failure_output(job);
        }
    }

    if !cmd.no_history {
        let summary = create_summary(&build);
        store.save_build(&summary).await?;
        println!(
            "\n{} Build saved to history (ID: {})",
            INFO,
            style(&summary.build_id.to_string()[..8]).dim()
        );
    }

    let icon = if status == ExecutionStatus::Passed { CHECK } else { CROSS };
    println!(
        "\n{} {} {}",
        icon,
        style(&build.name).bold(),
        format_status(status)
    );
    if status != ExecutionStatus::Passed {
        error!("Build {} did not pass: {}", build.name, status);
    }

    Ok(status == ExecutionStatus::Passed)
}

/// Show the tail of the output of the command that failed a job
fn print_failure_output(job: &cirun::core::Job) {
    let Some(phase) = job.state.failed_phase else {
        return;
    };
    let failed = job.steps_in(phase).find_map(|step| match &step.state {
        cirun::core::StepState::Failed { output, error, .. } => {
            Some((step.command.run.as_str(), output.as_str(), error.as_str()))
        }
        _ => None,
    });

    if let Some((command, output, error)) = failed {
        println!("    {} {} ({})", style("$").dim(), command, style(error).red());
        for line in format_output(output, 10).lines() {
            println!("    {}", style(line).dim());
        }
    }
}

fn plan_build(cmd: &PlanCommand) -> Result<bool> {
    let build = load_build(&cmd.file, &cmd.channel)?;
    let plan = build.plan();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", format_plan(&plan));
    }
    Ok(true)
}

fn validate_descriptor(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating {}...", INFO, cmd.file);

    let config = match CiConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(false);
        }
    };
    let matrix = match BuildMatrix::resolve(&config) {
        Ok(matrix) => matrix,
        Err(e) => {
            println!("{} Invalid build matrix:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(false);
        }
    };

    println!("{} Descriptor is valid!", CHECK);
    println!(
        "  Language: {}",
        style(config.language.as_deref().unwrap_or("(unset)")).bold()
    );
    println!("  Channels: {}", style(config.channels().join(", ")).cyan());
    println!("  Jobs: {}", style(matrix.len()).cyan());
    for phase in Phase::ALL {
        let count = config.effective_entries(phase).len();
        if count > 0 {
            println!("  {}: {} command(s)", phase, style(count).cyan());
        }
    }
    let packages = config.apt_packages();
    if !packages.is_empty() {
        println!("  addons.apt: {}", style(packages.join(" ")).dim());
    }

    if cmd.json {
        println!("\n{}", serde_json::to_string_pretty(&config)?);
    }
    if cmd.emit {
        println!("\n{}", config.to_yaml()?);
    }
    Ok(true)
}

async fn list_descriptors(cmd: &ListCommand) -> Result<bool> {
    let store = open_store().await?;
    let descriptors = store.list_descriptors().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for descriptor in &descriptors {
            let builds = store.list_builds(Some(descriptor)).await?;
            json_data.push(serde_json::json!({
                "descriptor": descriptor,
                "build_count": builds.len(),
            }));
        }
        let data = serde_json::json!({ "descriptors": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if descriptors.is_empty() {
        println!("{} No builds found in history", INFO);
        return Ok(true);
    }

    println!("{} Descriptors in history:", INFO);
    for descriptor in &descriptors {
        if cmd.with_counts {
            let builds = store.list_builds(Some(descriptor)).await?;
            let passed = builds.iter().filter(|b| b.status == ExecutionStatus::Passed).count();
            println!(
                "  {} ({} builds: {} passed, {} did not pass)",
                style(descriptor).bold(),
                style(builds.len()).cyan(),
                style(passed).green(),
                style(builds.len() - passed).red()
            );
        } else {
            println!("  {}", style(descriptor).bold());
        }
    }

    Ok(true)
}

async fn show_history(cmd: &HistoryCommand) -> Result<bool> {
    let store = open_store().await?;

    if let Some(id) = &cmd.build_id {
        let build_id = uuid::Uuid::parse_str(id).context("Invalid build ID format")?;
        match store.load_build(build_id).await? {
            Some(summary) if cmd.json => println!("{}", serde_json::to_string_pretty(&summary)?),
            Some(summary) => print_build_details(&summary),
            None => println!("{} Build not found", WARN),
        }
        return Ok(true);
    }

    let builds: Vec<BuildSummary> = store
        .list_builds(cmd.descriptor.as_deref())
        .await?
        .into_iter()
        .take(cmd.limit)
        .collect();

    if cmd.json {
        let data = serde_json::json!({ "builds": builds });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if builds.is_empty() {
        println!("{} No builds found", INFO);
        return Ok(true);
    }

    println!("{} Build history (showing latest {}):", INFO, cmd.limit);
    for summary in &builds {
        println!("  {}", format_build_summary(summary));
    }

    Ok(true)
}

fn print_build_details(summary: &BuildSummary) {
    println!("{} Build Details", INFO);
    println!("  ID: {}", style(summary.build_id).cyan());
    println!("  Descriptor: {}", style(&summary.descriptor).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {} total, {} passed, {} failed, {} errored, {} cancelled",
        summary.total_jobs,
        style(summary.passed_jobs).green(),
        style(summary.failed_jobs).red(),
        style(summary.errored_jobs).red(),
        style(summary.cancelled_jobs).yellow()
    );
}
