//! SQLite-based build history store

use crate::persistence::{BuildSummary, PersistenceBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

const SELECT_BUILDS: &str = r#"
    SELECT id, descriptor, status, started_at, completed_at,
           total_jobs, passed_jobs, failed_jobs, errored_jobs, cancelled_jobs
    FROM builds
"#;

/// SQLite build store
pub struct SqliteBuildStore {
    pool: SqlitePool,
}

impl SqliteBuildStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
            .create_if_missing(true);
        // every in-memory connection is a separate database
        let max_connections = if db_path == ":memory:" { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("cirun");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        let db_path = db_dir.join("builds.db");
        Self::new(&db_path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS builds (
                id TEXT PRIMARY KEY,
                descriptor TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                total_jobs INTEGER NOT NULL DEFAULT 0,
                passed_jobs INTEGER NOT NULL DEFAULT 0,
                failed_jobs INTEGER NOT NULL DEFAULT 0,
                errored_jobs INTEGER NOT NULL DEFAULT 0,
                cancelled_jobs INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_descriptor ON builds(descriptor);
            CREATE INDEX IF NOT EXISTS idx_started_at ON builds(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn row_to_summary(row: &SqliteRow) -> Result<BuildSummary> {
        Ok(BuildSummary {
            build_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            descriptor: row.get("descriptor"),
            status: row.get::<String, _>("status").parse()?,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            total_jobs: row.get::<i64, _>("total_jobs") as usize,
            passed_jobs: row.get::<i64, _>("passed_jobs") as usize,
            failed_jobs: row.get::<i64, _>("failed_jobs") as usize,
            errored_jobs: row.get::<i64, _>("errored_jobs") as usize,
            cancelled_jobs: row.get::<i64, _>("cancelled_jobs") as usize,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteBuildStore {
    async fn save_build(&self, build: &BuildSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO builds
            (id, descriptor, status, started_at, completed_at,
             total_jobs, passed_jobs, failed_jobs, errored_jobs, cancelled_jobs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(build.build_id.to_string())
        .bind(&build.descriptor)
        .bind(build.status.to_string())
        .bind(Self::to_naive(build.started_at))
        .bind(build.completed_at.map(Self::to_naive))
        .bind(build.total_jobs as i64)
        .bind(build.passed_jobs as i64)
        .bind(build.failed_jobs as i64)
        .bind(build.errored_jobs as i64)
        .bind(build.cancelled_jobs as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save build")?;

        Ok(())
    }

    async fn load_build(&self, build_id: Uuid) -> Result<Option<BuildSummary>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_BUILDS))
            .bind(build_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load build")?;

        row.as_ref().map(Self::row_to_summary).transpose()
    }

    async fn list_builds(&self, descriptor: Option<&str>) -> Result<Vec<BuildSummary>> {
        let rows = match descriptor {
            Some(descriptor) => {
                sqlx::query(&format!(
                    "{} WHERE descriptor = ?1 ORDER BY started_at DESC",
                    SELECT_BUILDS
                ))
                .bind(descriptor)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY started_at DESC", SELECT_BUILDS))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("Failed to list builds")?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn list_descriptors(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT descriptor FROM builds ORDER BY descriptor ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list descriptors")?;

        Ok(rows.iter().map(|row| row.get("descriptor")).collect())
    }
}
