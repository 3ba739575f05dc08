use thiserror::Error;

/// Errors raised while turning a results directory into a ZIP archive
#[derive(Error, Debug)]
pub enum PackagingError {
    /// The directory failed structural validation. Raised before any archive I/O.
    #[error("Invalid results directory: {0}")]
    InvalidResultsDirectory(String),

    /// Building the ZIP container itself failed
    #[error("Failed to create ZIP file: {message}")]
    Packaging {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the object storage adapter.
///
/// Messages are passed through credential sanitization before any of these
/// variants are built, so they are safe to log.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("s3_prefix.job_id ({prefix_job_id}) does not match job_id ({job_id})")]
    PrefixMismatch { prefix_job_id: i64, job_id: i64 },

    #[error("Failed to upload results to S3: {0}")]
    Upload(String),

    #[error("Failed to generate download URL: {0}")]
    Presign(String),

    #[error("Invalid S3 URL format: {0}")]
    InvalidUrl(String),
}

/// Errors raised by the run and job repositories
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("No {entity} row with id {id}")]
    MissingRow { entity: &'static str, id: i64 },

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the results use cases
#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Job {0} not found")]
    JobNotFound(i64),

    #[error("Run {0} not found")]
    RunNotFound(i64),

    #[error("Run {run_id} does not belong to job {job_id}")]
    RunJobMismatch { run_id: i64, job_id: i64 },

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Repository lookup failed: {0}")]
    Repository(#[from] RepositoryError),

    /// The archive reached object storage but the run row was not updated.
    /// The uploaded object is left in place and must be reconciled.
    #[error("Results uploaded to {orphaned_s3_url} but database update failed: {source}")]
    Metadata {
        orphaned_s3_url: String,
        #[source]
        source: RepositoryError,
    },
}

impl ResultsError {
    /// URL of an object written to storage whose metadata write failed
    pub fn orphaned_s3_url(&self) -> Option<&str> {
        match self {
            ResultsError::Metadata {
                orphaned_s3_url, ..
            } => Some(orphaned_s3_url),
            _ => None,
        }
    }
}
