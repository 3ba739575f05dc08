use crate::config::DatabaseConfig;
use crate::error::RepositoryError;
use crate::models::{Job, Run, RunStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Persistence for runs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn find_by_id(&self, run_id: i64) -> Result<Option<Run>, RepositoryError>;

    async fn find_by_job_id(&self, job_id: i64) -> Result<Vec<Run>, RepositoryError>;

    /// Persist the mutable fields of an existing run
    async fn save(&self, run: &Run) -> Result<(), RepositoryError>;
}

/// Read access to jobs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, job_id: i64) -> Result<Option<Job>, RepositoryError>;
}

/// Row shape of the `runs` table
#[derive(Debug, FromRow)]
struct RunRow {
    id: i64,
    job_id: i64,
    user_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    request: serde_json::Value,
    status: String,
    config_url: Option<String>,
    results_url: Option<String>,
    results_uploaded_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for Run {
    type Error = RepositoryError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<RunStatus>()
            .map_err(|_| RepositoryError::InvalidValue {
                field: "runs.status".to_string(),
                value: row.status.clone(),
            })?;

        Ok(Run {
            id: row.id,
            job_id: row.job_id,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            request: row.request,
            status,
            config_url: row.config_url,
            results_url: row.results_url,
            results_uploaded_at: row.results_uploaded_at,
        })
    }
}

const RUN_COLUMNS: &str = "id, job_id, user_id, created_at, updated_at, request, status, \
                           config_url, results_url, results_uploaded_at";

/// PostgreSQL-backed run and job repository
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RunRepository for PgMetadataStore {
    async fn find_by_id(&self, run_id: i64) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {} FROM runs WHERE id = $1",
            RUN_COLUMNS
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Run::try_from).transpose()
    }

    async fn find_by_job_id(&self, job_id: i64) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {} FROM runs WHERE job_id = $1 ORDER BY id ASC",
            RUN_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Run::try_from).collect()
    }

    #[instrument(skip(self, run), fields(run_id = run.id, status = %run.status))]
    async fn save(&self, run: &Run) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = $2,
                config_url = $3,
                results_url = $4,
                results_uploaded_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.status.as_str())
        .bind(&run.config_url)
        .bind(&run.results_url)
        .bind(run.results_uploaded_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::MissingRow {
                entity: "run",
                id: run.id,
            });
        }

        debug!("Run saved");
        Ok(())
    }
}

#[async_trait]
impl JobRepository for PgMetadataStore {
    async fn find_by_id(&self, job_id: i64) -> Result<Option<Job>, RepositoryError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, user_id, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(status: &str) -> RunRow {
        let created = Utc.with_ymd_and_hms(2025, 10, 23, 21, 15, 0).unwrap();
        RunRow {
            id: 4,
            job_id: 12,
            user_id: 1,
            created_at: created,
            updated_at: created,
            request: serde_json::json!({"simulation": "influenza"}),
            status: status.to_string(),
            config_url: Some("https://example/config".to_string()),
            results_url: None,
            results_uploaded_at: None,
        }
    }

    #[test]
    fn test_run_row_conversion() {
        let run = Run::try_from(row("RUNNING")).unwrap();

        assert_eq!(run.id, 4);
        assert_eq!(run.job_id, 12);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.request["simulation"], "influenza");
    }

    #[test]
    fn test_legacy_status_conversion() {
        let run = Run::try_from(row("Submitted")).unwrap();
        assert_eq!(run.status, RunStatus::Submitted);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = Run::try_from(row("EXPLODED")).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::InvalidValue { ref value, .. } if value == "EXPLODED"
        ));
    }
}
