use crate::models::Job;
use chrono::{DateTime, SubsecRound, Utc};

/// Storage key prefix shared by every artifact of one job.
///
/// Derived from the job's persisted creation time, never from "now", so runs
/// that finish minutes or days apart still land under the same directory:
///
/// ```text
/// jobs/12/2025/10/23/211500/
///   job_config.json
///   job_input.zip
///   run_4_config.json
///   run_4_results.zip
///   run_4_logs.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobS3Prefix {
    job_id: i64,
    timestamp: DateTime<Utc>,
}

impl JobS3Prefix {
    /// Derive the prefix for a job. Sub-second precision is dropped.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            timestamp: job.created_at.trunc_subsecs(0),
        }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Format: jobs/{job_id}/{yyyy}/{mm}/{dd}/{HHMMSS}, no trailing slash
    pub fn base_prefix(&self) -> String {
        format!(
            "jobs/{}/{}",
            self.job_id,
            self.timestamp.format("%Y/%m/%d/%H%M%S")
        )
    }

    pub fn job_config_key(&self) -> String {
        format!("{}/job_config.json", self.base_prefix())
    }

    pub fn job_input_key(&self) -> String {
        format!("{}/job_input.zip", self.base_prefix())
    }

    pub fn run_config_key(&self, run_id: i64) -> String {
        format!("{}/run_{}_config.json", self.base_prefix(), run_id)
    }

    pub fn run_results_key(&self, run_id: i64) -> String {
        format!("{}/run_{}_results.zip", self.base_prefix(), run_id)
    }

    pub fn run_logs_key(&self, run_id: i64) -> String {
        format!("{}/run_{}_logs.log", self.base_prefix(), run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn job_created_at(created_at: DateTime<Utc>) -> Job {
        Job {
            id: 12,
            user_id: 1,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_base_prefix_format() {
        let job = job_created_at(Utc.with_ymd_and_hms(2025, 10, 23, 21, 15, 0).unwrap());
        let prefix = JobS3Prefix::from_job(&job);

        assert_eq!(prefix.job_id(), 12);
        assert_eq!(prefix.base_prefix(), "jobs/12/2025/10/23/211500");
    }

    #[test]
    fn test_sub_second_precision_is_dropped() {
        let created = Utc.with_ymd_and_hms(2025, 10, 23, 21, 15, 0).unwrap()
            + Duration::milliseconds(987);
        let prefix = JobS3Prefix::from_job(&job_created_at(created));

        assert_eq!(
            prefix.timestamp(),
            Utc.with_ymd_and_hms(2025, 10, 23, 21, 15, 0).unwrap()
        );
        assert_eq!(prefix.base_prefix(), "jobs/12/2025/10/23/211500");
    }

    #[test]
    fn test_prefix_is_stable_across_derivations() {
        let job = job_created_at(Utc.with_ymd_and_hms(2024, 1, 5, 3, 4, 5).unwrap());

        let first = JobS3Prefix::from_job(&job);
        let second = JobS3Prefix::from_job(&job.clone());

        assert_eq!(first, second);
        assert_eq!(first.base_prefix(), "jobs/12/2024/01/05/030405");
    }

    #[test]
    fn test_artifact_keys() {
        let job = job_created_at(Utc.with_ymd_and_hms(2025, 10, 23, 21, 15, 0).unwrap());
        let prefix = JobS3Prefix::from_job(&job);

        assert_eq!(
            prefix.job_config_key(),
            "jobs/12/2025/10/23/211500/job_config.json"
        );
        assert_eq!(
            prefix.job_input_key(),
            "jobs/12/2025/10/23/211500/job_input.zip"
        );
        assert_eq!(
            prefix.run_config_key(4),
            "jobs/12/2025/10/23/211500/run_4_config.json"
        );
        assert_eq!(
            prefix.run_results_key(4),
            "jobs/12/2025/10/23/211500/run_4_results.zip"
        );
        assert_eq!(
            prefix.run_logs_key(4),
            "jobs/12/2025/10/23/211500/run_4_logs.log"
        );
    }
}
