//! Normalization of model findings into canonical [`Finding`] records and
//! merging with static results.

use serde_json::{Map, Value};

use crate::finding::{AnalysisReport, Finding, Severity, NO_CODE};

pub const INCOMPLETE_ANALYSIS: &str = "Analysis incomplete - model did not return structured data";
pub const NO_SUGGESTIONS: &str = "No specific suggestions at this time";

/// A finding as it arrives from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFinding {
    /// A bare value; rendered into the message.
    Scalar(String),
    /// A mapping that may carry any subset of the finding fields.
    Partial(Map<String, Value>),
}

impl RawFinding {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => RawFinding::Partial(map),
            Value::String(s) => RawFinding::Scalar(s),
            other => RawFinding::Scalar(other.to_string()),
        }
    }

    /// Convert into a complete finding, defaulting to `severity`.
    pub fn into_finding(self, severity: Severity) -> Finding {
        match self {
            RawFinding::Scalar(message) => Finding::new(0, severity, message, NO_CODE),
            RawFinding::Partial(map) => {
                let line = map.get("line").and_then(parse_line).unwrap_or(0);
                let severity = map
                    .get("severity")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(severity);
                let message = match map.get("message") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => Value::Object(map.clone()).to_string(),
                };
                let code = match map.get("code") {
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    _ => NO_CODE.to_string(),
                };
                Finding::new(line, severity, message, code)
            }
        }
    }
}

/// Accept non-negative integers and digit strings.
fn parse_line(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Model keys and the severity each implies.
const KEYS: &[(&str, Severity)] = &[
    ("issues", Severity::Error),
    ("errors", Severity::Error),
    ("warnings", Severity::Warning),
    ("suggestions", Severity::Info),
];

/// Entries under a key; a lone value counts as one entry and `null` as none.
fn entries(value: Option<&Value>) -> Vec<RawFinding> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().cloned().map(RawFinding::from_value).collect(),
        Some(other) => vec![RawFinding::from_value(other.clone())],
    }
}

/// Merge the extracted model output with the static findings.
pub fn merge(
    parsed: Option<Value>,
    static_errors: Vec<Finding>,
    static_warnings: Vec<Finding>,
) -> AnalysisReport {
    let map = match parsed {
        Some(Value::Object(map)) => map,
        _ => return incomplete_report(static_errors, static_warnings),
    };

    let mut errors = static_errors;
    let mut warnings = static_warnings;
    let mut suggestions = Vec::new();

    for (key, severity) in KEYS {
        let normalized = entries(map.get(*key))
            .into_iter()
            .map(|raw| raw.into_finding(*severity));
        match severity {
            Severity::Error => errors.extend(normalized),
            Severity::Warning => warnings.extend(normalized),
            Severity::Info => suggestions.extend(normalized),
        }
    }

    if suggestions.is_empty() {
        suggestions.push(Finding::info(NO_SUGGESTIONS));
    }

    let summary = match map.get("summary") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => format!(
            "Analysis complete: {} errors, {} warnings",
            errors.len(),
            warnings.len()
        ),
        Some(other) => other.to_string(),
    };

    AnalysisReport::new(errors, warnings, suggestions, summary)
}

/// Report used when the model output held no usable object.
pub fn incomplete_report(errors: Vec<Finding>, warnings: Vec<Finding>) -> AnalysisReport {
    AnalysisReport::new(
        errors,
        warnings,
        vec![Finding::info(INCOMPLETE_ANALYSIS)],
        INCOMPLETE_ANALYSIS,
    )
}
