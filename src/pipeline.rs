//! The analysis pipeline.
//!
//! source → static checker → decision policy → (report) or
//! (model gateway → extractor → normalizer → report)

use std::sync::Arc;
use thiserror::Error;

use crate::checker::StaticChecker;
use crate::config::Config;
use crate::extract::extract_json;
use crate::finding::{AnalysisReport, Finding};
use crate::gateway::{GatewayError, ModelGateway, ModelRuntime};
use crate::normalize;
use crate::policy::{self, Decision, PolicyMode};

pub const MODEL_UNAVAILABLE: &str = "AI model unavailable, static analysis only";
pub const INFERENCE_FAILED: &str = "AI model inference failed, static analysis only";

/// Errors that abort an analysis run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("{0}")]
    Inference(String),
}

/// Runs one submission through the full pipeline.
pub struct Analyzer {
    checker: StaticChecker,
    policy: PolicyMode,
    gateway: ModelGateway,
    fallback_on_inference_failure: bool,
}

impl Analyzer {
    pub fn new(checker: StaticChecker, policy: PolicyMode, gateway: ModelGateway) -> Self {
        Self {
            checker,
            policy,
            gateway,
            fallback_on_inference_failure: true,
        }
    }

    /// Build an analyzer from configuration and a model runtime.
    pub fn from_config(config: &Config, runtime: Arc<dyn ModelRuntime>) -> Self {
        Self {
            checker: StaticChecker::new(config.checker.clone()),
            policy: config.policy,
            gateway: ModelGateway::from_config(runtime, &config.model),
            fallback_on_inference_failure: config.model.fallback_on_inference_failure,
        }
    }

    /// Fall back to static results when generation fails instead of
    /// returning [`AnalysisError::Inference`].
    pub fn fallback_on_inference_failure(mut self, enabled: bool) -> Self {
        self.fallback_on_inference_failure = enabled;
        self
    }

    pub fn policy(&self) -> PolicyMode {
        self.policy
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Analyze one submission.
    pub async fn analyze(
        &self,
        code: &str,
        file_name: &str,
        file_type: &str,
    ) -> Result<AnalysisReport, AnalysisError> {
        let findings = self.checker.check(code, file_name, file_type);

        let (errors, warnings) = match policy::decide(findings, self.policy) {
            Decision::ShortCircuit(report) => {
                tracing::debug!(
                    policy = %self.policy,
                    errors = report.errors().len(),
                    warnings = report.warnings().len(),
                    "short-circuit"
                );
                return Ok(report);
            }
            Decision::Consult { errors, warnings } => (errors, warnings),
        };

        tracing::debug!(
            policy = %self.policy,
            model = %self.gateway.model_name(),
            "consulting model"
        );

        match self.gateway.analyze(code).await {
            Ok(text) => {
                let parsed = extract_json(&text);
                if parsed.is_none() {
                    tracing::warn!(output_len = text.len(), "model returned no structured data");
                }
                Ok(normalize::merge(parsed, errors, warnings))
            }
            Err(GatewayError::ModelUnavailable(reason)) => {
                tracing::warn!(%reason, "falling back to static analysis");
                Ok(static_fallback(errors, warnings, MODEL_UNAVAILABLE))
            }
            Err(GatewayError::InferenceFailure(reason)) => {
                if self.fallback_on_inference_failure {
                    tracing::warn!(%reason, "inference failed, falling back to static analysis");
                    Ok(static_fallback(errors, warnings, INFERENCE_FAILED))
                } else {
                    tracing::error!(%reason, "inference failed");
                    Err(AnalysisError::Inference(reason))
                }
            }
        }
    }
}

/// Static-only report used when the model cannot contribute.
fn static_fallback(errors: Vec<Finding>, warnings: Vec<Finding>, reason: &str) -> AnalysisReport {
    let summary = format!(
        "Basic analysis complete: {} potential issues found",
        warnings.len()
    );
    AnalysisReport::new(errors, warnings, vec![Finding::info(reason)], summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;

    #[test]
    fn test_static_fallback_counts_warnings() {
        let warnings = vec![
            Finding::new(1, Severity::Warning, "a", "x"),
            Finding::new(2, Severity::Warning, "b", "y"),
        ];
        let report = static_fallback(Vec::new(), warnings, MODEL_UNAVAILABLE);
        assert_eq!(report.summary(), "Basic analysis complete: 2 potential issues found");
        assert_eq!(report.suggestions(), &[Finding::info(MODEL_UNAVAILABLE)]);
        assert_eq!(report.warnings().len(), 2);
    }
}
