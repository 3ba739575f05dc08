use crate::clock::Clock;
use crate::error::{PackagingError, ResultsError};
use crate::job_prefix::JobS3Prefix;
use crate::metadata_store::{JobRepository, RunRepository};
use crate::results_packager::ResultsPackager;
use crate::s3_results::ResultsRepository;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Upload use case: package a run's results directory, push it to object
/// storage under the job's prefix, then record the URL on the run.
///
/// Steps run strictly in sequence. Nothing is retried and the storage write
/// is not rolled back if the metadata write after it fails; that case is
/// reported as [`ResultsError::Metadata`] carrying the orphaned URL.
pub struct ResultsUploader {
    run_repository: Arc<dyn RunRepository>,
    job_repository: Arc<dyn JobRepository>,
    packager: Arc<dyn ResultsPackager>,
    results_repository: Arc<dyn ResultsRepository>,
    clock: Arc<dyn Clock>,
}

impl ResultsUploader {
    pub fn new(
        run_repository: Arc<dyn RunRepository>,
        job_repository: Arc<dyn JobRepository>,
        packager: Arc<dyn ResultsPackager>,
        results_repository: Arc<dyn ResultsRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            run_repository,
            job_repository,
            packager,
            results_repository,
            clock,
        }
    }

    /// Upload results for `run_id` and return the stored object URL
    #[instrument(skip(self, results_dir), fields(results_dir = %results_dir.display()))]
    pub async fn upload_results(
        &self,
        run_id: i64,
        job_id: i64,
        results_dir: &Path,
    ) -> Result<String, ResultsError> {
        let job = self
            .job_repository
            .find_by_id(job_id)
            .await?
            .ok_or(ResultsError::JobNotFound(job_id))?;

        let mut run = self
            .run_repository
            .find_by_id(run_id)
            .await?
            .ok_or(ResultsError::RunNotFound(run_id))?;

        if run.job_id != job_id {
            return Err(ResultsError::RunJobMismatch { run_id, job_id });
        }

        let s3_prefix = JobS3Prefix::from_job(&job);

        let packager = Arc::clone(&self.packager);
        let dir = results_dir.to_path_buf();
        let packaged = tokio::task::spawn_blocking(move || packager.package_directory(&dir))
            .await
            .map_err(|e| PackagingError::Packaging {
                message: results_dir.display().to_string(),
                source: io::Error::new(io::ErrorKind::Other, e),
            })??;
        info!(
            file_count = packaged.file_count(),
            size_bytes = packaged.total_size_bytes(),
            directory = %packaged.directory_name(),
            "Packaged results"
        );

        let size_bytes = packaged.total_size_bytes();
        let location = self
            .results_repository
            .upload_results(job_id, run_id, packaged.into_zip_content(), &s3_prefix)
            .await?;

        metrics::counter!("results.bytes.uploaded").increment(size_bytes as u64);

        run.record_results(location.url.clone(), self.clock.now_utc());

        if let Err(source) = self.run_repository.save(&run).await {
            error!(
                orphaned_s3_url = %location.url,
                error = %source,
                "Results uploaded to S3 but run metadata update failed"
            );
            metrics::counter!("results.uploads.orphaned").increment(1);
            return Err(ResultsError::Metadata {
                orphaned_s3_url: location.url,
                source,
            });
        }

        metrics::counter!("results.uploads.completed").increment(1);
        info!(
            results_url = %location.url,
            status = %run.status,
            "Run results recorded"
        );

        Ok(location.url)
    }
}
