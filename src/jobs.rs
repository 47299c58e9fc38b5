//! Background analysis jobs.
//!
//! A job is registered as `pending`, executed on its own Tokio task and
//! polled by id. Jobs live for the lifetime of the registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::finding::AnalysisReport;
use crate::pipeline::Analyzer;

pub type JobId = Uuid;

/// Errors from the job registry and orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("no async runtime available to run jobs")]
    NoRuntime,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a tracked job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Set once the job is `done`.
    pub result: Option<AnalysisReport>,
    /// Set once the job is `failed`.
    pub error: Option<String>,
}

impl Job {
    fn pending(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// Thread-safe job table. Every transition is validated under the write lock.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job and return its id.
    pub fn insert_pending(&self) -> JobId {
        let id = Uuid::new_v4();
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(id, Job::pending(id));
        id
    }

    /// Snapshot of a job.
    pub fn get(&self, id: JobId) -> Result<Job, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Look up a job by its textual id; malformed ids are not found.
    pub fn get_str(&self, id: &str) -> Result<Job, JobError> {
        let parsed = Uuid::parse_str(id.trim()).map_err(|_| JobError::NotFound(id.to_string()))?;
        self.get(parsed)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mark_running(&self, id: JobId) -> Result<(), JobError> {
        self.transition(id, JobStatus::Running, |_| {})
    }

    pub fn complete(&self, id: JobId, report: AnalysisReport) -> Result<(), JobError> {
        self.transition(id, JobStatus::Done, |job| job.result = Some(report))
    }

    pub fn fail(&self, id: JobId, error: impl Into<String>) -> Result<(), JobError> {
        let error = error.into();
        self.transition(id, JobStatus::Failed, |job| job.error = Some(error))
    }

    fn transition<F>(&self, id: JobId, to: JobStatus, apply: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if !job.status.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        job.status = to;
        apply(job);
        tracing::debug!(job_id = %id, status = %to, "job transition");
        Ok(())
    }
}

/// Submits analyses as background tasks and tracks them in a registry.
#[derive(Clone)]
pub struct JobOrchestrator {
    analyzer: Arc<Analyzer>,
    registry: Arc<JobRegistry>,
}

impl JobOrchestrator {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self {
            analyzer,
            registry: Arc::new(JobRegistry::new()),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Register a job and start it in the background.
    ///
    /// Returns as soon as the job is registered; it must be called from
    /// inside a Tokio runtime.
    pub fn submit(
        &self,
        code: impl Into<String>,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Result<JobId, JobError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| JobError::NoRuntime)?;
        let id = self.registry.insert_pending();
        tracing::info!(job_id = %id, "job submitted");

        let submission = Submission {
            code: code.into(),
            file_name: file_name.into(),
            file_type: file_type.into(),
        };
        handle.spawn(run_job(
            id,
            Arc::clone(&self.analyzer),
            Arc::clone(&self.registry),
            submission,
        ));

        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Result<Job, JobError> {
        self.registry.get(id)
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait(&self, id: JobId, poll_interval: Duration) -> Result<Job, JobError> {
        loop {
            let job = self.registry.get(id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

struct Submission {
    code: String,
    file_name: String,
    file_type: String,
}

async fn run_job(
    id: JobId,
    analyzer: Arc<Analyzer>,
    registry: Arc<JobRegistry>,
    submission: Submission,
) {
    if let Err(e) = registry.mark_running(id) {
        tracing::error!(job_id = %id, error = %e, "job could not start");
        return;
    }

    // Inner task so a panic in the pipeline is reported instead of
    // leaving the job running forever.
    let inner = tokio::spawn(async move {
        analyzer
            .analyze(
                &submission.code,
                &submission.file_name,
                &submission.file_type,
            )
            .await
    });

    let recorded = match inner.await {
        Ok(Ok(report)) => {
            tracing::info!(job_id = %id, errors = report.errors().len(), "job done");
            registry.complete(id, report)
        }
        Ok(Err(e)) => {
            tracing::warn!(job_id = %id, error = %e, "job failed");
            registry.fail(id, e.to_string())
        }
        Err(join_error) => {
            let message = join_message(join_error);
            tracing::error!(job_id = %id, error = %message, "job panicked");
            registry.fail(id, message)
        }
    };

    if let Err(e) = recorded {
        tracing::error!(job_id = %id, error = %e, "job result not recorded");
    }
}

fn join_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return "analysis task was cancelled".to_string();
    }
    let payload = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("analysis panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("analysis panicked: {}", s)
    } else {
        "analysis panicked".to_string()
    }
}
