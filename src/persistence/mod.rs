//! Persistence layer for build history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteBuildStore;

pub use crate::core::ExecutionStatus;
use crate::core::Build;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a finished build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub build_id: Uuid,

    /// Descriptor the build was resolved from
    pub descriptor: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,
    pub passed_jobs: usize,
    pub failed_jobs: usize,
    pub errored_jobs: usize,
    pub cancelled_jobs: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a build summary, replacing one with the same id
    async fn save_build(&self, build: &BuildSummary) -> Result<()>;

    /// Load a build by ID
    async fn load_build(&self, build_id: Uuid) -> Result<Option<BuildSummary>>;

    /// Builds newest first, optionally only those of one descriptor
    async fn list_builds(&self, descriptor: Option<&str>) -> Result<Vec<BuildSummary>>;

    /// Descriptor names with at least one build, sorted
    async fn list_descriptors(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    builds: RwLock<HashMap<Uuid, BuildSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_build(&self, build: &BuildSummary) -> Result<()> {
        self.builds.write().await.insert(build.build_id, build.clone());
        Ok(())
    }

    async fn load_build(&self, build_id: Uuid) -> Result<Option<BuildSummary>> {
        Ok(self.builds.read().await.get(&build_id).cloned())
    }

    async fn list_builds(&self, descriptor: Option<&str>) -> Result<Vec<BuildSummary>> {
        let builds = self.builds.read().await;
        let mut result: Vec<BuildSummary> = builds
            .values()
            .filter(|b| descriptor.map_or(true, |d| b.descriptor == d))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_descriptors(&self) -> Result<Vec<String>> {
        let builds = self.builds.read().await;
        let mut names: Vec<String> = builds.values().map(|b| b.descriptor.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a build
pub fn create_summary(build: &Build) -> BuildSummary {
    BuildSummary {
        build_id: build.state.build_id,
        descriptor: build.name.clone(),
        status: build.state.status,
        started_at: build.state.started_at.unwrap_or_else(Utc::now),
        completed_at: build.state.completed_at,
        total_jobs: build.state.total_jobs,
        passed_jobs: build.state.passed_jobs,
        failed_jobs: build.state.failed_jobs,
        errored_jobs: build.state.errored_jobs,
        cancelled_jobs: build.state.cancelled_jobs,
    }
}
