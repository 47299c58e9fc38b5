//! Canonical diagnostic records shared by every pipeline stage.

use serde::{Deserialize, Serialize};

/// Placeholder used when a finding has no associated source snippet.
pub const NO_CODE: &str = "N/A";

/// Severity levels for findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// A single diagnostic record.
///
/// `line` is 1-indexed; 0 marks a file-level finding or an unknown location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub line: u64,
    pub severity: Severity,
    pub message: String,
    pub code: String,
}

impl Finding {
    pub fn new(line: u64, severity: Severity, message: impl Into<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            line,
            severity,
            message: message.into(),
            code: if code.is_empty() { NO_CODE.to_string() } else { code },
        }
    }

    /// A file-level informational finding with no snippet.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(0, Severity::Info, message, NO_CODE)
    }
}

/// The full output of one analysis run.
///
/// Built once through [`AnalysisReport::new`] and read through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    errors: Vec<Finding>,
    warnings: Vec<Finding>,
    suggestions: Vec<Finding>,
    summary: String,
}

impl AnalysisReport {
    pub fn new(
        errors: Vec<Finding>,
        warnings: Vec<Finding>,
        suggestions: Vec<Finding>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            errors,
            warnings,
            suggestions,
            summary: summary.into(),
        }
    }

    pub fn errors(&self) -> &[Finding] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    pub fn suggestions(&self) -> &[Finding] {
        &self.suggestions
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Check if the report carries any error-severity findings.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Iterate over every finding in report order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.suggestions.iter())
    }
}
