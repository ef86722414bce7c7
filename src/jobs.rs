//! Jobs described as data and resolved into throttled operations at runtime.
//!
//! A job names its operation through `kind`. A kind that does not resolve to an
//! operation is rejected with [`ThrottlerError::InvalidOperation`] before any slot is
//! requested.

use crate::error::{ThrottlerError, ThrottlerResult};
use crate::throttler::Throttler;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use validator::Validate;

fn generated_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A single job to run through the throttler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobSpec {
    #[serde(default = "generated_name")]
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    pub kind: String,
    /// Simulated work done while holding the slot
    #[serde(default, with = "humantime_serde")]
    pub duration: Duration,
}

impl JobSpec {
    pub fn succeed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            kind: "succeed".to_string(),
            duration,
        }
    }

    pub fn fail(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            kind: "fail".to_string(),
            duration,
        }
    }

    /// Resolve `kind` into an operation, or reject it as not invocable
    fn operation(&self) -> ThrottlerResult<JobOperation> {
        match self.kind.as_str() {
            "succeed" => Ok(JobOperation::Succeed),
            "fail" => Ok(JobOperation::Fail),
            other => Err(ThrottlerError::InvalidOperation(format!(
                "No or invalid operation given for job '{}': '{}'",
                self.name, other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JobOperation {
    Succeed,
    Fail,
}

impl JobOperation {
    async fn run(self, name: &str, duration: Duration) -> Result<(), JobFailure> {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        match self {
            JobOperation::Succeed => Ok(()),
            JobOperation::Fail => Err(JobFailure(name.to_string())),
        }
    }
}

/// The failure raised by a `fail` job
#[derive(Debug, Clone, Error)]
#[error("job '{0}' failed")]
pub struct JobFailure(pub String);

/// A file of jobs
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobBatch {
    #[validate(length(min = 1), nested)]
    pub jobs: Vec<JobSpec>,
}

impl JobBatch {
    /// Load and validate a batch from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> ThrottlerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let batch: JobBatch = serde_json::from_str(&contents)?;
        batch.validate()?;
        Ok(batch)
    }

    /// Generate `count` jobs, making every `fail_every`-th one fail (0 disables failures)
    pub fn generate(count: usize, work: Duration, fail_every: usize) -> Self {
        let jobs = (1..=count)
            .map(|i| {
                let name = format!("job-{}", i);
                if fail_every > 0 && i % fail_every == 0 {
                    JobSpec::fail(name, work)
                } else {
                    JobSpec::succeed(name, work)
                }
            })
            .collect();

        Self { jobs }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Rejected,
}

/// Outcome of one job, with timings measured from the batch origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub status: JobStatus,
    pub started_after_ms: Option<u64>,
    pub finished_after_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobReport {
    fn rejected(name: &str, err: &ThrottlerError, origin: Instant) -> Self {
        Self {
            name: name.to_string(),
            status: JobStatus::Rejected,
            started_after_ms: None,
            finished_after_ms: origin.elapsed().as_millis() as u64,
            error: Some(err.to_string()),
        }
    }
}

/// Run one job through the throttler.
///
/// A job whose operation fails still produces a report; only a job that cannot be
/// invoked at all is an error.
pub async fn run_job(
    throttler: &Throttler,
    spec: &JobSpec,
    origin: Instant,
) -> ThrottlerResult<JobReport> {
    spec.validate()?;
    let operation = spec.operation()?;

    let (started_at, result) = throttler
        .throttle(move || async move {
            let started_at = Instant::now();
            tracing::debug!(job = %spec.name, "Job started");
            (started_at, operation.run(&spec.name, spec.duration).await)
        })
        .await;

    let (status, error) = match result {
        Ok(()) => (JobStatus::Succeeded, None),
        Err(failure) => {
            tracing::warn!(job = %spec.name, error = %failure, "Job failed");
            (JobStatus::Failed, Some(failure.to_string()))
        }
    };

    Ok(JobReport {
        name: spec.name.clone(),
        status,
        started_after_ms: Some((started_at - origin).as_millis() as u64),
        finished_after_ms: origin.elapsed().as_millis() as u64,
        error,
    })
}

/// Issue every job at once and collect the reports in input order
pub async fn run_batch(throttler: &Throttler, jobs: Vec<JobSpec>) -> Vec<JobReport> {
    let origin = Instant::now();

    let handles: Vec<_> = jobs
        .into_iter()
        .map(|spec| {
            let throttler = throttler.clone();
            tokio::spawn(async move {
                match run_job(&throttler, &spec, origin).await {
                    Ok(report) => report,
                    Err(err) => {
                        tracing::warn!(job = %spec.name, error = %err, "Job rejected");
                        JobReport::rejected(&spec.name, &err, origin)
                    }
                }
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(err) => tracing::error!(error = %err, "Job task did not complete"),
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottlerConfig;

    #[test]
    fn test_job_spec_defaults() {
        let spec: JobSpec = serde_json::from_str(r#"{"kind": "succeed"}"#).unwrap();

        assert_eq!(spec.duration, Duration::ZERO);
        assert!(uuid::Uuid::parse_str(&spec.name).is_ok());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_job_spec_duration_is_humantime() {
        let spec: JobSpec =
            serde_json::from_str(r#"{"name": "fetch", "kind": "fail", "duration": "250ms"}"#)
                .unwrap();

        assert_eq!(spec, JobSpec::fail("fetch", Duration::from_millis(250)));
    }

    #[test]
    fn test_unknown_kind_is_invalid_operation() {
        let spec = JobSpec {
            name: "answer".to_string(),
            kind: "42".to_string(),
            duration: Duration::ZERO,
        };

        assert!(matches!(
            spec.operation(),
            Err(ThrottlerError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_empty_name_fails_validation() {
        let spec = JobSpec::succeed("", Duration::ZERO);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_generate_marks_every_nth_job_as_failing() {
        let batch = JobBatch::generate(6, Duration::from_millis(10), 3);
        let kinds: Vec<_> = batch.jobs.iter().map(|job| job.kind.as_str()).collect();

        assert_eq!(
            kinds,
            ["succeed", "succeed", "fail", "succeed", "succeed", "fail"]
        );
        assert_eq!(batch.jobs[0].name, "job-1");

        let no_failures = JobBatch::generate(4, Duration::ZERO, 0);
        assert!(no_failures.jobs.iter().all(|job| job.kind == "succeed"));
    }

    #[test]
    fn test_empty_batch_fails_validation() {
        let batch = JobBatch { jobs: Vec::new() };
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_report_serialization() {
        let report = JobReport {
            name: "job-1".to_string(),
            status: JobStatus::Succeeded,
            started_after_ms: Some(0),
            finished_after_ms: 12,
            error: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_failed_job_is_reported_not_raised() {
        let throttler = Throttler::new(ThrottlerConfig::new(1, Duration::ZERO));

        let report = run_job(
            &throttler,
            &JobSpec::fail("broken", Duration::ZERO),
            Instant::now(),
        )
        .await
        .unwrap();

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("job 'broken' failed"));
        assert_eq!(throttler.stats().available, 1);
    }
}
