//! Short-circuit decision policy.
//!
//! Decides from the static checker's output whether a report can be
//! returned immediately or the model gateway should be consulted.

use serde::{Deserialize, Serialize};

use crate::checker::StaticFindings;
use crate::finding::{AnalysisReport, Finding};

/// Which static outcomes are allowed to reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Every static outcome short-circuits; the model is never consulted
    /// for a recognized language.
    #[default]
    StaticOnly,
    /// Warnings and unsupported file types are sent to the model.
    ModelAssisted,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::StaticOnly => "static-only",
            PolicyMode::ModelAssisted => "model-assisted",
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static-only" => Ok(PolicyMode::StaticOnly),
            "model-assisted" => Ok(PolicyMode::ModelAssisted),
            _ => Err(format!(
                "invalid policy {:?}, must be 'static-only' or 'model-assisted'",
                s
            )),
        }
    }
}

/// Outcome of the decision policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Return this report without invoking the model.
    ShortCircuit(AnalysisReport),
    /// Ask the model, then merge its findings with these static ones.
    Consult {
        errors: Vec<Finding>,
        warnings: Vec<Finding>,
    },
}

pub const SUGGEST_CHECK_BALANCE: &str = "Check for missing closing brackets, parentheses, or quotes";
pub const SUGGEST_CHECK_IMPORTS: &str =
    "Verify all imports are correct and variable names are spelled correctly";
pub const SUGGEST_FIX_SYNTAX: &str = "Fix syntax errors before further analysis";
pub const SUGGEST_REVIEW_WARNINGS: &str =
    "Code is syntactically correct. Review warnings for potential improvements.";
pub const SUGGEST_CLEAN: &str = "No obvious issues detected. Code appears syntactically correct.";
pub const SUMMARY_CLEAN: &str = "Static analysis complete: No issues found";

/// Decide what to do with a static result.
pub fn decide(findings: StaticFindings, mode: PolicyMode) -> Decision {
    let StaticFindings {
        errors,
        warnings,
        unsupported,
    } = findings;

    if unsupported && mode == PolicyMode::ModelAssisted {
        // The generic parse error only says the checker could not look at it
        return Decision::Consult {
            errors: Vec::new(),
            warnings,
        };
    }

    if !errors.is_empty() {
        let suggestions = error_suggestions(&errors);
        let summary = format!("Found {} syntax error(s) that must be fixed", errors.len());
        return Decision::ShortCircuit(AnalysisReport::new(errors, warnings, suggestions, summary));
    }

    if !warnings.is_empty() {
        if mode == PolicyMode::ModelAssisted {
            return Decision::Consult { errors, warnings };
        }
        let summary = format!(
            "No syntax errors found. {} potential issue(s) detected.",
            warnings.len()
        );
        return Decision::ShortCircuit(AnalysisReport::new(
            Vec::new(),
            warnings,
            vec![Finding::info(SUGGEST_REVIEW_WARNINGS)],
            summary,
        ));
    }

    Decision::ShortCircuit(clean_report())
}

/// The fixed report for a submission with no findings.
pub fn clean_report() -> AnalysisReport {
    AnalysisReport::new(
        Vec::new(),
        Vec::new(),
        vec![Finding::info(SUGGEST_CLEAN)],
        SUMMARY_CLEAN,
    )
}

/// Whether the message names a missing closing bracket or quote.
fn expects_closing_delimiter(msg: &str) -> bool {
    msg.strip_prefix("expected '")
        .and_then(|rest| rest.strip_suffix('\''))
        .is_some_and(|delimiter| matches!(delimiter, ")" | "]" | "}" | "\"" | "'"))
}

/// Pick suggestions by matching keywords in error messages.
fn error_suggestions(errors: &[Finding]) -> Vec<Finding> {
    let mut suggestions = Vec::new();

    for error in errors {
        let msg = error.message.to_lowercase();
        if msg.contains("unexpected eof")
            || msg.contains("invalid syntax")
            || msg.contains("unterminated string")
            || expects_closing_delimiter(&msg)
        {
            suggestions.push(Finding::info(SUGGEST_CHECK_BALANCE));
        }
        if msg.contains("name") && msg.contains("defined") {
            suggestions.push(Finding::info(SUGGEST_CHECK_IMPORTS));
        }
    }

    if suggestions.is_empty() {
        suggestions.push(Finding::info(SUGGEST_FIX_SYNTAX));
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;

    fn error(message: &str) -> Finding {
        Finding::new(1, Severity::Error, message, "x")
    }

    fn warning(name: &str) -> Finding {
        Finding::new(2, Severity::Warning, format!("Potentially undefined name: '{}'", name), "y")
    }

    fn short_circuit(decision: Decision) -> AnalysisReport {
        match decision {
            Decision::ShortCircuit(report) => report,
            other => panic!("expected short circuit, got {:?}", other),
        }
    }

    #[test]
    fn test_errors_short_circuit() {
        let findings = StaticFindings::syntax_error(error("invalid syntax"));
        let report = short_circuit(decide(findings, PolicyMode::StaticOnly));
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.suggestions().len(), 1);
        assert_eq!(report.suggestions()[0].message, SUGGEST_CHECK_BALANCE);
        assert_eq!(report.summary(), "Found 1 syntax error(s) that must be fixed");
    }

    #[test]
    fn test_errors_short_circuit_in_model_assisted_mode() {
        let findings = StaticFindings::syntax_error(error("unexpected EOF while parsing"));
        let report = short_circuit(decide(findings, PolicyMode::ModelAssisted));
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn test_name_defined_suggestion() {
        let findings = StaticFindings::syntax_error(error("name 'x' is not defined"));
        let report = short_circuit(decide(findings, PolicyMode::StaticOnly));
        assert_eq!(report.suggestions().len(), 1);
        assert_eq!(report.suggestions()[0].message, SUGGEST_CHECK_IMPORTS);
    }

    #[test]
    fn test_unclosed_delimiter_suggestion() {
        for message in ["expected ')'", "expected ']'", "expected '}'", "unterminated string literal"] {
            let findings = StaticFindings::syntax_error(error(message));
            let report = short_circuit(decide(findings, PolicyMode::StaticOnly));
            assert_eq!(report.suggestions().len(), 1, "{}", message);
            assert_eq!(report.suggestions()[0].message, SUGGEST_CHECK_BALANCE, "{}", message);
        }
    }

    #[test]
    fn test_generic_error_suggestion() {
        let findings = StaticFindings::syntax_error(error("expected ':'"));
        let report = short_circuit(decide(findings, PolicyMode::StaticOnly));
        assert_eq!(report.suggestions().len(), 1);
        assert_eq!(report.suggestions()[0].message, SUGGEST_FIX_SYNTAX);
    }

    #[test]
    fn test_warnings_short_circuit() {
        let findings = StaticFindings::with_warnings(vec![warning("x"), warning("y")]);
        let report = short_circuit(decide(findings, PolicyMode::StaticOnly));
        assert!(report.errors().is_empty());
        assert_eq!(report.warnings().len(), 2);
        assert_eq!(report.suggestions()[0].message, SUGGEST_REVIEW_WARNINGS);
        assert_eq!(
            report.summary(),
            "No syntax errors found. 2 potential issue(s) detected."
        );
    }

    #[test]
    fn test_clean_short_circuit() {
        for mode in [PolicyMode::StaticOnly, PolicyMode::ModelAssisted] {
            let report = short_circuit(decide(StaticFindings::clean(), mode));
            assert_eq!(report, clean_report());
        }
    }

    #[test]
    fn test_model_assisted_consults_on_warnings() {
        let findings = StaticFindings::with_warnings(vec![warning("x")]);
        match decide(findings, PolicyMode::ModelAssisted) {
            Decision::Consult { errors, warnings } => {
                assert!(errors.is_empty());
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("expected consult, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_file_type() {
        let findings = StaticFindings::unsupported("main.go", "");

        let report = short_circuit(decide(findings.clone(), PolicyMode::StaticOnly));
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.suggestions()[0].message, SUGGEST_FIX_SYNTAX);

        assert_eq!(
            decide(findings, PolicyMode::ModelAssisted),
            Decision::Consult {
                errors: vec![],
                warnings: vec![]
            }
        );
    }

    #[test]
    fn test_policy_mode_parse() {
        assert_eq!("static-only".parse(), Ok(PolicyMode::StaticOnly));
        assert_eq!("model-assisted".parse(), Ok(PolicyMode::ModelAssisted));
        assert!("always".parse::<PolicyMode>().is_err());
    }
}
