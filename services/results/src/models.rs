use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "NOT_STARTED")]
    NotStarted,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "DONE")]
    Done,
    // Legacy values still present in older rows
    #[serde(rename = "Submitted")]
    Submitted,
    #[serde(rename = "Failed")]
    Failed,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::NotStarted => "NOT_STARTED",
            RunStatus::Running => "RUNNING",
            RunStatus::Error => "ERROR",
            RunStatus::Done => "DONE",
            RunStatus::Submitted => "Submitted",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(RunStatus::Queued),
            "NOT_STARTED" => Ok(RunStatus::NotStarted),
            "RUNNING" => Ok(RunStatus::Running),
            "ERROR" => Ok(RunStatus::Error),
            "DONE" => Ok(RunStatus::Done),
            "Submitted" => Ok(RunStatus::Submitted),
            "Failed" => Ok(RunStatus::Failed),
            "Cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Job as seen by the results subsystem (read-only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub user_id: i64,
    /// Creation time; anchors the storage prefix of every run of the job
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single simulation run belonging to a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: i64,
    pub job_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Full run request as submitted by the client
    pub request: serde_json::Value,
    pub status: RunStatus,
    /// Presigned URL for the run configuration
    pub config_url: Option<String>,
    /// Object URL of the uploaded results archive
    pub results_url: Option<String>,
    pub results_uploaded_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Record a completed results upload and mark the run done
    pub fn record_results(&mut self, results_url: String, uploaded_at: DateTime<Utc>) {
        self.results_url = Some(results_url);
        self.results_uploaded_at = Some(uploaded_at);
        self.status = RunStatus::Done;
    }
}

/// Location of an object in storage, returned by the storage adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadLocation {
    pub url: String,
}

/// Download information for one run's results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunResults {
    pub run_id: i64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trips_through_storage_text() {
        for status in [
            RunStatus::Queued,
            RunStatus::NotStarted,
            RunStatus::Running,
            RunStatus::Error,
            RunStatus::Done,
            RunStatus::Submitted,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
        }
        assert!("done".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_record_results_marks_run_done() {
        let created = Utc.with_ymd_and_hms(2025, 10, 23, 21, 15, 0).unwrap();
        let uploaded = Utc.with_ymd_and_hms(2025, 10, 23, 22, 0, 0).unwrap();
        let mut run = Run {
            id: 4,
            job_id: 12,
            user_id: 1,
            created_at: created,
            updated_at: created,
            request: serde_json::json!({}),
            status: RunStatus::Running,
            config_url: None,
            results_url: None,
            results_uploaded_at: None,
        };

        run.record_results("https://bucket.s3.amazonaws.com/a.zip".to_string(), uploaded);

        assert_eq!(run.status, RunStatus::Done);
        assert_eq!(
            run.results_url.as_deref(),
            Some("https://bucket.s3.amazonaws.com/a.zip")
        );
        assert_eq!(run.results_uploaded_at, Some(uploaded));
    }

    #[test]
    fn test_status_serializes_as_stored_text() {
        let json = serde_json::to_string(&RunStatus::NotStarted).unwrap();
        assert_eq!(json, "\"NOT_STARTED\"");
    }
}
