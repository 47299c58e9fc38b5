//! Typed entry points over the pipeline and job orchestrator.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::finding::AnalysisReport;
use crate::jobs::{Job, JobError, JobId, JobOrchestrator};
use crate::pipeline::Analyzer;

/// Errors returned to service callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InternalError(String),
}

impl ServiceError {
    /// Matching HTTP status code, for transports that need one.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::InternalError(_) => 500,
        }
    }
}

impl From<JobError> for ServiceError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(_) => ServiceError::NotFound("Job not found".to_string()),
            other => ServiceError::InternalError(other.to_string()),
        }
    }
}

/// One analysis submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub code: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
}

impl AnalysisRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            file_name: String::new(),
            file_type: String::new(),
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.code.is_empty() {
            return Err(ServiceError::BadRequest("No code provided".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: AnalysisReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Synchronous, asynchronous and status entry points.
#[derive(Clone)]
pub struct AnalysisService {
    analyzer: Arc<Analyzer>,
    jobs: JobOrchestrator,
}

impl AnalysisService {
    pub fn new(analyzer: Analyzer) -> Self {
        let analyzer = Arc::new(analyzer);
        Self {
            jobs: JobOrchestrator::new(Arc::clone(&analyzer)),
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Run the pipeline and wait for the report.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalyzeResponse, ServiceError> {
        request.validate()?;
        let analysis = self
            .analyzer
            .analyze(&request.code, &request.file_name, &request.file_type)
            .await
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        Ok(AnalyzeResponse { analysis })
    }

    /// Start a background job for the request.
    pub fn submit(&self, request: AnalysisRequest) -> Result<SubmitResponse, ServiceError> {
        request.validate()?;
        let job_id = self
            .jobs
            .submit(request.code, request.file_name, request.file_type)?;
        Ok(SubmitResponse { job_id })
    }

    /// Current state of a job; unknown or malformed ids are not found.
    pub fn status(&self, job_id: &str) -> Result<Job, ServiceError> {
        Ok(self.jobs.registry().get_str(job_id)?)
    }

    /// Poll a job until it is done or failed.
    pub async fn wait(&self, job_id: JobId, poll_interval: Duration) -> Result<Job, ServiceError> {
        Ok(self.jobs.wait(job_id, poll_interval).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: AnalysisRequest =
            serde_json::from_str(r#"{"code": "x = 1", "fileName": "a.py"}"#).unwrap();
        assert_eq!(request.code, "x = 1");
        assert_eq!(request.file_name, "a.py");
        assert_eq!(request.file_type, "");
    }

    #[test]
    fn test_empty_code_rejected() {
        let err = AnalysisRequest::new("").validate().unwrap_err();
        assert_eq!(err, ServiceError::BadRequest("No code provided".to_string()));
        assert_eq!(err.status_code(), 400);
        // Whitespace is still code
        assert!(AnalysisRequest::new(" ").validate().is_ok());
    }

    #[test]
    fn test_job_error_mapping() {
        assert_eq!(
            ServiceError::from(JobError::NotFound("x".into())),
            ServiceError::NotFound("Job not found".into())
        );
        assert_eq!(ServiceError::from(JobError::NoRuntime).status_code(), 500);
    }

    #[test]
    fn test_submit_response_shape() {
        let response = SubmitResponse {
            job_id: uuid::Uuid::nil(),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"job_id":"00000000-0000-0000-0000-000000000000"}"#
        );
    }
}
