//! Epistemix Results Service
//!
//! Packages FRED simulation output and uploads it to S3, then records the
//! upload on the run it belongs to.
//!
//! ## Features
//!
//! - **Safe Packaging**: Only `RUN*` directories are archived, and no file
//!   that resolves outside its run directory (e.g. through a symlink) is
//!   ever read into the archive
//! - **Stable Storage Layout**: Every run of a job uploads under one prefix
//!   derived from the job's creation time
//! - **Explicit Partial Failure**: When the upload succeeds but the run
//!   update does not, the error carries the orphaned object URL for
//!   reconciliation
//! - **Download URLs**: Presigned links for every run of a job
//!
//! ## Architecture
//!
//! ```text
//!  results dir             S3 Bucket                     PostgreSQL
//! ┌──────────────┐        ┌────────────────────┐        ┌──────────────┐
//! │ output/      │        │ jobs/{job_id}/     │        │ jobs         │
//! │   RUN1/      │        │   {yyyy/mm/dd}/    │        │ runs         │
//! │   RUN2/      │        │   {HHMMSS}/        │        └──────────────┘
//! └──────────────┘        │   run_{id}_results │               ▲
//!        │                └────────────────────┘               │
//!        ▼                          ▲                          │
//! ┌──────────────┐         ┌──────────────┐           ┌──────────────┐
//! │ Directory    │────────▶│ S3 Results   │──────────▶│ Metadata     │
//! │ Archiver     │         │ Repository   │           │ Store        │
//! └──────────────┘         └──────────────┘           └──────────────┘
//!        ▲                          ▲                          ▲
//!        └──────────────────┬───────┴──────────────────────────┘
//!                    ┌──────────────┐
//!                    │ Results      │
//!                    │ Uploader     │
//!                    └──────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod job_prefix;
pub mod metadata_store;
pub mod models;
pub mod results_packager;
pub mod run_results;
pub mod s3_results;
pub mod upload_results;

pub use clock::{Clock, SystemClock};
pub use config::{Config, ConfigError};
pub use error::{PackagingError, RepositoryError, ResultsError, StorageError};
pub use job_prefix::JobS3Prefix;
pub use metadata_store::{JobRepository, PgMetadataStore, RunRepository};
pub use models::{Job, Run, RunResults, RunStatus, UploadLocation};
pub use results_packager::{
    DirectoryArchiver, PackagedResults, PrefixMatcher, ResultsPackager, RunDirectoryMatcher,
};
pub use run_results::RunResultsQuery;
pub use s3_results::{ResultsRepository, S3ResultsRepository};
pub use upload_results::ResultsUploader;
