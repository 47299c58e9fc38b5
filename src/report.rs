//! Output formatting for analysis results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: the service response shape, for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};

use crate::finding::{AnalysisReport, Finding, Severity};
use crate::jobs::{Job, JobStatus};
use crate::policy::PolicyMode;
use crate::service::AnalyzeResponse;

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pretty,
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Format::Pretty),
            "json" => Ok(Format::Json),
            _ => Err(format!("invalid format {:?}, must be 'pretty' or 'json'", s)),
        }
    }
}

/// One file's outcome in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    /// Why no job was submitted for the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchEntry {
    pub fn submitted(path: String, job: Job) -> Self {
        Self {
            path,
            job: Some(job),
            error: None,
        }
    }

    pub fn unreadable(path: String, error: String) -> Self {
        Self {
            path,
            job: None,
            error: Some(error),
        }
    }

    /// The file could not be read or its job failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
            || self
                .job
                .as_ref()
                .is_some_and(|job| job.status == JobStatus::Failed)
    }

    /// The file was analyzed and has error findings.
    pub fn has_errors(&self) -> bool {
        self.job
            .as_ref()
            .and_then(|job| job.result.as_ref())
            .is_some_and(|report| report.has_errors())
    }
}

// =============================================================================
// JSON Format
// =============================================================================

/// Render a single analysis as pretty-printed JSON.
pub fn render_json(response: &AnalyzeResponse) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(response)?)
}

pub fn write_json(response: &AnalyzeResponse) -> anyhow::Result<()> {
    println!("{}", render_json(response)?);
    Ok(())
}

pub fn render_batch_json(entries: &[BatchEntry]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

pub fn write_batch_json(entries: &[BatchEntry]) -> anyhow::Result<()> {
    println!("{}", render_batch_json(entries)?);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write one report with a header.
pub fn write_pretty(path: &str, config_path: Option<&str>, policy: PolicyMode, report: &AnalysisReport) {
    write_header(config_path, policy);

    print!("  {}", "File:     ".dimmed());
    println!("{}", path);
    println!();

    write_report_body(report);
}

/// Write every batch entry under a single header.
pub fn write_batch_pretty(
    root: &str,
    config_path: Option<&str>,
    policy: PolicyMode,
    entries: &[BatchEntry],
) {
    write_header(config_path, policy);

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", root);
    println!();

    for entry in entries {
        println!("  {}", entry.path.blue().bold());
        let error = entry
            .error
            .as_ref()
            .or_else(|| entry.job.as_ref().and_then(|job| job.error.as_ref()));
        match (&entry.job, error) {
            (Some(Job { status: JobStatus::Done, result: Some(report), .. }), _) => {
                write_report_body(report)
            }
            (_, Some(error)) => {
                println!("  {}  {}", "✗ FAILED".red(), error);
                println!();
            }
            (job, None) => {
                let status = job.as_ref().map_or("missing".to_string(), |j| j.status.to_string());
                println!("  {}", format!("job {}", status).dimmed());
                println!();
            }
        }
    }

    let failed = entries.iter().filter(|e| e.is_failed()).count();
    let with_errors = entries.iter().filter(|e| e.has_errors()).count();
    println!(
        "  {} file(s) analyzed, {} with errors, {} failed",
        entries.len(),
        with_errors,
        failed
    );
    println!();
}

fn write_header(config_path: Option<&str>, policy: PolicyMode) {
    println!();
    print!("  ");
    print!("{}", "codesift".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Config:   ".dimmed());
    println!("{}", config_path.unwrap_or("(defaults)"));
    print!("  {}", "Policy:   ".dimmed());
    println!("{}", policy);
}

fn write_report_body(report: &AnalysisReport) {
    if report.has_errors() {
        print!("  {}", "✗ ERRORS".red());
    } else if !report.warnings().is_empty() {
        print!("  {}", "! WARNINGS".yellow());
    } else {
        print!("  {}", "✓ CLEAN".green());
    }
    println!("  {}", report.summary());
    println!();

    write_section("Errors", report.errors());
    write_section("Warnings", report.warnings());
    write_section("Suggestions", report.suggestions());
}

fn write_section(title: &str, findings: &[Finding]) {
    if findings.is_empty() {
        return;
    }

    println!("  {} ({}):", title.bold(), findings.len());
    println!();

    for f in findings {
        write_severity_tag(&f.severity);
        if f.line > 0 {
            print!("{}", format!("line {:<5}", f.line).dimmed());
        }
        println!("{}", f.message);
        if f.code != crate::finding::NO_CODE {
            println!("            {}", f.code.dimmed());
        }
    }
    println!();
}

fn write_severity_tag(severity: &Severity) {
    match severity {
        Severity::Error => print!("    {} ", "ERROR".red()),
        Severity::Warning => print!("    {} ", "WARN ".yellow()),
        Severity::Info => print!("    {} ", "INFO ".blue()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::clean_report;

    #[test]
    fn test_format_parse() {
        assert_eq!("json".parse(), Ok(Format::Json));
        assert_eq!("pretty".parse(), Ok(Format::Pretty));
        assert!("sarif".parse::<Format>().is_err());
    }

    #[test]
    fn test_json_wraps_analysis() {
        let response = AnalyzeResponse {
            analysis: clean_report(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&render_json(&response).unwrap()).unwrap();
        assert_eq!(
            value["analysis"]["summary"],
            "Static analysis complete: No issues found"
        );
        assert_eq!(value["analysis"]["errors"], serde_json::json!([]));
        assert_eq!(value["analysis"]["suggestions"][0]["severity"], "info");
    }

    #[test]
    fn test_batch_json_lists_path_and_job() {
        let entries = vec![
            BatchEntry::submitted(
                "pkg/mod.py".to_string(),
                Job {
                    id: uuid::Uuid::nil(),
                    status: JobStatus::Failed,
                    result: None,
                    error: Some("boom".to_string()),
                },
            ),
            BatchEntry::unreadable(
                "pkg/latin1.py".to_string(),
                "cannot read file: stream did not contain valid UTF-8".to_string(),
            ),
        ];
        let value: serde_json::Value =
            serde_json::from_str(&render_batch_json(&entries).unwrap()).unwrap();
        assert_eq!(value[0]["path"], "pkg/mod.py");
        assert_eq!(value[0]["job"]["status"], "failed");
        assert_eq!(value[0]["job"]["error"], "boom");
        assert!(value[0].get("error").is_none());

        assert_eq!(value[1]["path"], "pkg/latin1.py");
        assert!(value[1].get("job").is_none());
        assert!(value[1]["error"].as_str().unwrap().starts_with("cannot read file"));

        assert!(entries.iter().all(BatchEntry::is_failed));
        assert!(!entries.iter().any(BatchEntry::has_errors));
    }
}
