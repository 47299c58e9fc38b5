//! Deterministic syntax and scope checking.
//!
//! The checker resolves the submission's language, parses it with
//! tree-sitter, checks block layout and the constructs the grammar is more
//! lenient about, and reports either one syntax error or a list of
//! possibly-undefined names. It never fails: every problem, including an
//! unsupported file type, is reported as a [`Finding`].

mod builtins;
#[cfg(feature = "tree-sitter")]
mod layout;
#[cfg(feature = "tree-sitter")]
mod python;

pub use builtins::is_builtin;

use std::path::Path;

use crate::config::CheckerConfig;
use crate::finding::{Finding, Severity, NO_CODE};

/// Languages the static checker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
        }
    }

    /// File extensions handled by this language (without dot).
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyw"],
        }
    }

    /// Determine language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyw" => Some(Language::Python),
            _ => None,
        }
    }

    /// Determine language from a declared file type.
    pub fn from_file_type(file_type: &str) -> Option<Self> {
        match file_type.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" | "pyw" | "text/x-python" | "application/x-python" => {
                Some(Language::Python)
            }
            _ => None,
        }
    }

    /// Resolve the language of a submission.
    ///
    /// A recognized declared file type wins; otherwise the file name's
    /// extension decides.
    pub fn resolve(file_name: &str, file_type: &str) -> Option<Self> {
        Self::from_file_type(file_type).or_else(|| {
            Path::new(file_name)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(Self::from_extension)
        })
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of the static checker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticFindings {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    /// Set when the file type was not recognized; `errors` then holds a
    /// single generic parse error.
    pub unsupported: bool,
}

impl StaticFindings {
    pub fn clean() -> Self {
        Self::default()
    }

    /// A single syntax error finding.
    pub fn syntax_error(error: Finding) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    /// Possibly-undefined name warnings from a successful parse.
    pub fn with_warnings(warnings: Vec<Finding>) -> Self {
        Self {
            warnings,
            ..Self::default()
        }
    }

    /// A generic parse error not tied to a source location.
    pub fn parse_failure(detail: impl std::fmt::Display) -> Self {
        Self::syntax_error(Finding::new(
            0,
            Severity::Error,
            format!("Parse Error: {}", detail),
            NO_CODE,
        ))
    }

    /// The submission's file type is not one the checker handles.
    pub fn unsupported(file_name: &str, file_type: &str) -> Self {
        let described = if !file_type.trim().is_empty() {
            format!("file type {:?}", file_type.trim())
        } else if !file_name.is_empty() {
            format!("file {:?}", file_name)
        } else {
            "submission without a file name or type".to_string()
        };
        Self {
            unsupported: true,
            ..Self::parse_failure(format!("unsupported {}", described))
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Static syntax and scope checker.
#[derive(Debug, Clone, Default)]
pub struct StaticChecker {
    config: CheckerConfig,
}

impl StaticChecker {
    pub fn new(config: CheckerConfig) -> Self {
        Self { config }
    }

    /// Check a submission.
    pub fn check(&self, source: &str, file_name: &str, file_type: &str) -> StaticFindings {
        let findings = match Language::resolve(file_name, file_type) {
            Some(language) => self.check_language(language, source),
            None => StaticFindings::unsupported(file_name, file_type),
        };

        tracing::debug!(
            file = %file_name,
            errors = findings.errors.len(),
            warnings = findings.warnings.len(),
            unsupported = findings.unsupported,
            "static check complete"
        );

        findings
    }

    #[cfg(feature = "tree-sitter")]
    fn check_language(&self, language: Language, source: &str) -> StaticFindings {
        match language {
            Language::Python => python::check(source, &self.config),
        }
    }

    #[cfg(not(feature = "tree-sitter"))]
    fn check_language(&self, language: Language, _source: &str) -> StaticFindings {
        StaticFindings::parse_failure(format!("{} support is not compiled in", language))
    }
}

/// Return the 1-indexed source line, trimmed, if it exists.
pub(crate) fn source_line(source: &str, line: u64) -> Option<&str> {
    if line == 0 {
        return None;
    }
    source
        .split('\n')
        .nth((line - 1) as usize)
        .map(|l| l.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_resolve() {
        assert_eq!(Language::resolve("a.py", ""), Some(Language::Python));
        assert_eq!(Language::resolve("gui.PYW", ""), Some(Language::Python));
        assert_eq!(Language::resolve("", "Python"), Some(Language::Python));
        assert_eq!(Language::resolve("snippet.txt", "text/x-python"), Some(Language::Python));
        // Unrecognized declared type falls back to the extension
        assert_eq!(Language::resolve("a.py", "text/plain"), Some(Language::Python));
        assert_eq!(Language::resolve("main.go", ""), None);
        assert_eq!(Language::resolve("", ""), None);
    }

    #[test]
    fn test_source_line() {
        let source = "first\n    second  \nthird";
        assert_eq!(source_line(source, 1), Some("first"));
        assert_eq!(source_line(source, 2), Some("second"));
        assert_eq!(source_line(source, 0), None);
        assert_eq!(source_line(source, 4), None);
    }

    #[test]
    fn test_unsupported_file_type() {
        let checker = StaticChecker::default();
        let findings = checker.check("fn main() {}", "main.rs", "");
        assert!(findings.unsupported);
        assert_eq!(findings.errors.len(), 1);
        assert_eq!(findings.errors[0].line, 0);
        assert_eq!(findings.errors[0].code, NO_CODE);
        assert!(findings.errors[0].message.starts_with("Parse Error: unsupported"));
        assert!(findings.warnings.is_empty());
    }

    #[test]
    fn test_unsupported_message_prefers_declared_type() {
        let findings = StaticFindings::unsupported("x.js", "javascript");
        assert!(findings.errors[0].message.contains("\"javascript\""));
    }
}
