//! Main execution engine - orchestrates the jobs of a build

use crate::{
    core::{Build, ExecutionStatus, Phase},
    execution::{ExecutionScheduler, JobExecutor, SchedulingStrategy},
    runner::{CommandRunner, OutputStream, RunnerConfig},
};
use anyhow::{anyhow, Result};
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Events that can occur during a build
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    BuildStarted {
        build_id: Uuid,
        name: String,
        total_jobs: usize,
    },
    JobStarted {
        job: String,
        number: usize,
        channel: String,
    },
    PhaseStarted {
        job: String,
        phase: Phase,
    },
    CommandStarted {
        job: String,
        phase: Phase,
        command: String,
    },
    CommandOutput {
        job: String,
        stream: OutputStream,
        line: String,
    },
    CommandFinished {
        job: String,
        phase: Phase,
        command: String,
        exit_code: i32,
        duration_ms: u64,
    },
    /// The command could not be run at all (spawn failure, timeout)
    CommandFailed {
        job: String,
        phase: Phase,
        command: String,
        error: String,
    },
    CommandSkipped {
        job: String,
        phase: Phase,
        command: String,
        reason: String,
    },
    JobFinished {
        job: String,
        number: usize,
        status: ExecutionStatus,
        allow_failure: bool,
    },
    BuildFinished {
        build_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Shared list of event handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Main build execution engine
pub struct ExecutionEngine<R> {
    scheduler: ExecutionScheduler,
    executor: Arc<JobExecutor<R>>,
    events: EventBus,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, config: RunnerConfig, strategy: SchedulingStrategy) -> Self {
        let events = EventBus::default();
        let executor = Arc::new(JobExecutor::new(Arc::new(runner), config, events.clone()));

        Self {
            scheduler: ExecutionScheduler::new(strategy),
            executor,
            events,
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Execute every job of the build and settle its status
    pub async fn execute(&self, build: &mut Build) -> Result<ExecutionStatus> {
        let build_id = build.state.build_id;
        info!(
            "Starting build {} ({}) with {} job(s)",
            build.name,
            build_id,
            build.jobs.len()
        );
        self.events.emit(ExecutionEvent::BuildStarted {
            build_id,
            name: build.name.clone(),
            total_jobs: build.jobs.len(),
        });

        build.state.start(build.jobs.len());

        let order = self.scheduler.order(build);
        let limit = self.scheduler.concurrency(build.jobs.len());
        if limit <= 1 {
            self.run_sequential(build, order).await;
        } else {
            self.run_concurrent(build, order, limit).await?;
        }

        build.update_state_counts();
        let status = build.settle_status();
        build.state.finish(status);

        info!("Build {} finished: {}", build.name, status);
        self.events.emit(ExecutionEvent::BuildFinished { build_id, status });

        Ok(status)
    }

    async fn run_sequential(&self, build: &mut Build, order: Vec<usize>) {
        for index in order {
            if self.should_stop(build) {
                self.cancel_job(build, index);
                continue;
            }
            self.executor.execute(&mut build.jobs[index]).await;
            build.update_state_counts();
        }
    }

    async fn run_concurrent(&self, build: &mut Build, order: Vec<usize>, limit: usize) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for index in order {
            let mut job = build.jobs[index].clone();
            let executor = self.executor.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                executor.execute(&mut job).await;
                (index, job)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, job)) => {
                    build.jobs[index] = job;
                    build.update_state_counts();
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(anyhow!("Job task failed: {}", e)),
            }

            if !tasks.is_empty() && self.should_stop(build) {
                tasks.abort_all();
            }
        }

        for index in 0..build.jobs.len() {
            if !build.jobs[index].status().is_finished() {
                self.cancel_job(build, index);
            }
        }

        Ok(())
    }

    /// With fast finish, the remaining allowed failures are not waited for
    fn should_stop(&self, build: &Build) -> bool {
        build.fast_finish && build.required_jobs_finished()
    }

    fn cancel_job(&self, build: &mut Build, index: usize) {
        let job = &mut build.jobs[index];
        warn!("Cancelling job {}: required jobs finished", job.label());
        job.cancel("fast finish: required jobs already finished");
        self.events.emit(ExecutionEvent::JobFinished {
            job: job.label(),
            number: job.number,
            status: ExecutionStatus::Cancelled,
            allow_failure: job.allow_failure,
        });
    }
}
