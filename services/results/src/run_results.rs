use crate::error::ResultsError;
use crate::job_prefix::JobS3Prefix;
use crate::metadata_store::{JobRepository, RunRepository};
use crate::models::RunResults;
use crate::s3_results::{object_url, ResultsRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Download URLs for every run of a job.
///
/// Object keys are rebuilt from the job prefix and run id instead of being
/// read from `runs.results_url`, so runs whose metadata write was lost still
/// get a link to their uploaded archive.
pub struct RunResultsQuery {
    job_repository: Arc<dyn JobRepository>,
    run_repository: Arc<dyn RunRepository>,
    results_repository: Arc<dyn ResultsRepository>,
    bucket: String,
    expiration: Duration,
}

impl RunResultsQuery {
    pub fn new(
        job_repository: Arc<dyn JobRepository>,
        run_repository: Arc<dyn RunRepository>,
        results_repository: Arc<dyn ResultsRepository>,
        bucket: impl Into<String>,
        expiration: Duration,
    ) -> Self {
        Self {
            job_repository,
            run_repository,
            results_repository,
            bucket: bucket.into(),
            expiration,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_run_results(&self, job_id: i64) -> Result<Vec<RunResults>, ResultsError> {
        let job = self
            .job_repository
            .find_by_id(job_id)
            .await?
            .ok_or(ResultsError::JobNotFound(job_id))?;

        let s3_prefix = JobS3Prefix::from_job(&job);
        let runs = self.run_repository.find_by_job_id(job_id).await?;

        let mut results = Vec::with_capacity(runs.len());
        for run in runs {
            let results_url = object_url(&self.bucket, &s3_prefix.run_results_key(run.id));
            let location = self
                .results_repository
                .get_download_url(&results_url, self.expiration)
                .await?;

            results.push(RunResults {
                run_id: run.id,
                url: location.url,
            });
        }

        debug!(run_count = results.len(), "Generated run results URLs");

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::metadata_store::{MockJobRepository, MockRunRepository};
    use crate::models::{Job, Run, RunStatus, UploadLocation};
    use crate::s3_results::MockResultsRepository;
    use chrono::{TimeZone, Utc};

    fn test_job() -> Job {
        let created = Utc.with_ymd_and_hms(2025, 10, 23, 21, 15, 0).unwrap();
        Job {
            id: 12,
            user_id: 1,
            created_at: created,
            updated_at: created,
        }
    }

    fn test_run(run_id: i64) -> Run {
        let created = Utc.with_ymd_and_hms(2025, 10, 23, 21, 16, 0).unwrap();
        Run {
            id: run_id,
            job_id: 12,
            user_id: 1,
            created_at: created,
            updated_at: created,
            request: serde_json::json!({}),
            status: RunStatus::Done,
            config_url: None,
            results_url: None,
            results_uploaded_at: None,
        }
    }

    fn query(
        jobs: MockJobRepository,
        runs: MockRunRepository,
        storage: MockResultsRepository,
    ) -> RunResultsQuery {
        RunResultsQuery::new(
            Arc::new(jobs),
            Arc::new(runs),
            Arc::new(storage),
            "epx-results",
            Duration::from_secs(86400),
        )
    }

    #[tokio::test]
    async fn test_urls_for_every_run() {
        let mut jobs = MockJobRepository::new();
        jobs.expect_find_by_id()
            .returning(|_| Ok(Some(test_job())));

        let mut runs = MockRunRepository::new();
        runs.expect_find_by_job_id()
            .returning(|_| Ok(vec![test_run(4), test_run(5)]));

        let mut storage = MockResultsRepository::new();
        storage
            .expect_get_download_url()
            .withf(|url: &str, expiration: &Duration| {
                url.starts_with("https://epx-results.s3.amazonaws.com/jobs/12/2025/10/23/211500/run_")
                    && *expiration == Duration::from_secs(86400)
            })
            .times(2)
            .returning(|url, _| {
                Ok(UploadLocation {
                    url: format!("{}?X-Amz-Signature=abc", url),
                })
            });

        let results = query(jobs, runs, storage).get_run_results(12).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].run_id, 4);
        assert!(results[0].url.contains("run_4_results.zip?X-Amz-Signature="));
        assert_eq!(results[1].run_id, 5);
        assert!(results[1].url.contains("run_5_results.zip"));
    }

    #[tokio::test]
    async fn test_job_without_runs() {
        let mut jobs = MockJobRepository::new();
        jobs.expect_find_by_id()
            .returning(|_| Ok(Some(test_job())));

        let mut runs = MockRunRepository::new();
        runs.expect_find_by_job_id().returning(|_| Ok(vec![]));

        let mut storage = MockResultsRepository::new();
        storage.expect_get_download_url().times(0);

        let results = query(jobs, runs, storage).get_run_results(12).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_missing_job() {
        let mut jobs = MockJobRepository::new();
        jobs.expect_find_by_id().returning(|_| Ok(None));

        let mut runs = MockRunRepository::new();
        runs.expect_find_by_job_id().times(0);

        let err = query(jobs, runs, MockResultsRepository::new())
            .get_run_results(12)
            .await
            .unwrap_err();

        assert!(matches!(err, ResultsError::JobNotFound(12)));
    }

    #[tokio::test]
    async fn test_presign_failure_propagates() {
        let mut jobs = MockJobRepository::new();
        jobs.expect_find_by_id()
            .returning(|_| Ok(Some(test_job())));

        let mut runs = MockRunRepository::new();
        runs.expect_find_by_job_id()
            .returning(|_| Ok(vec![test_run(4)]));

        let mut storage = MockResultsRepository::new();
        storage
            .expect_get_download_url()
            .returning(|_, _| Err(StorageError::Presign("expired credentials".to_string())));

        let err = query(jobs, runs, storage).get_run_results(12).await.unwrap_err();

        assert!(matches!(err, ResultsError::Storage(StorageError::Presign(_))));
    }
}
