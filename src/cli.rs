//! Command-line interface for codesift.

use clap::{ArgAction, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use crate::checker::Language;
use crate::config::Config;
use crate::gateway::HttpRuntime;
use crate::pipeline::Analyzer;
use crate::policy::PolicyMode;
use crate::report::{self, BatchEntry, Format};
use crate::service::{AnalysisRequest, AnalysisService, ServiceError};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Jobs awaited concurrently by the batch command.
const BATCH_CONCURRENCY: usize = 32;

/// Directories never descended into by the batch command.
const SKIPPED_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    "site-packages",
    "venv",
];

/// Source analysis pipeline - static syntax/scope checks with optional
/// model-assisted review.
#[derive(Parser)]
#[command(name = "codesift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a single file and print its report
    #[command(visible_alias = "check")]
    Analyze(AnalyzeArgs),
    /// Analyze every supported file under a directory as background jobs
    Batch(BatchArgs),
    /// Write a default configuration file
    Init(InitArgs),
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// File to analyze ("-" reads standard input)
    pub file: PathBuf,

    /// Declared file type, e.g. "python" (default: from the extension)
    #[arg(long)]
    pub file_type: Option<String>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Path to configuration YAML (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured policy: static-only or model-assisted
    #[arg(long)]
    pub policy: Option<String>,
}

/// Arguments for the batch command.
#[derive(Parser)]
pub struct BatchArgs {
    /// Directory (or single file) to analyze
    pub path: PathBuf,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Path to configuration YAML (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured policy: static-only or model-assisted
    #[arg(long)]
    pub policy: Option<String>,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "codesift.yaml")]
    pub output: PathBuf,
}

/// Default configuration written by `init`.
pub const DEFAULT_TEMPLATE: &str = include_str!("templates/default.yaml");

/// Settings shared by the analyze and batch commands.
struct Setup {
    config: Config,
    config_path: Option<String>,
    format: Format,
}

fn setup(format: &str, config_path: Option<&Path>, policy: Option<&str>) -> anyhow::Result<Setup> {
    let format = format.parse::<Format>().map_err(anyhow::Error::msg)?;

    let (mut config, found) = Config::load(config_path)?;
    if let Some(policy) = policy {
        config.policy = policy.parse::<PolicyMode>().map_err(anyhow::Error::msg)?;
    }

    tracing::debug!(
        config = ?found,
        policy = %config.policy,
        endpoint = ?config.model.endpoint,
        "configuration loaded"
    );

    Ok(Setup {
        config,
        config_path: found.map(|p| p.to_string_lossy().to_string()),
        format,
    })
}

fn build_service(config: &Config) -> anyhow::Result<AnalysisService> {
    let runtime = HttpRuntime::new(
        config.model.endpoint.clone(),
        Duration::from_millis(config.model.timeout_ms),
    )?;
    let analyzer = Analyzer::from_config(config, Arc::new(runtime));
    Ok(AnalysisService::new(analyzer))
}

fn async_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    let setup = match setup(&args.format, args.config.as_deref(), args.policy.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let from_stdin = args.file.as_os_str() == "-";
    let code = if from_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        match std::fs::read_to_string(&args.file) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", args.file.display(), e);
                return Ok(EXIT_ERROR);
            }
        }
    };

    let file_name = if from_stdin {
        String::new()
    } else {
        args.file.to_string_lossy().to_string()
    };
    let request = AnalysisRequest::new(code)
        .file_name(file_name.clone())
        .file_type(args.file_type.clone().unwrap_or_default());

    let service = build_service(&setup.config)?;
    let runtime = async_runtime()?;
    let response = match runtime.block_on(service.analyze(request)) {
        Ok(r) => r,
        Err(ServiceError::BadRequest(msg)) => {
            eprintln!("Error: {}", msg);
            return Ok(EXIT_ERROR);
        }
        Err(e) => {
            eprintln!("Error: analysis failed: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    match setup.format {
        Format::Json => report::write_json(&response)?,
        Format::Pretty => {
            let shown = if from_stdin { "<stdin>" } else { file_name.as_str() };
            report::write_pretty(
                shown,
                setup.config_path.as_deref(),
                setup.config.policy,
                &response.analysis,
            );
        }
    }

    if response.analysis.has_errors() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Collect analyzable files under `root`.
fn collect_files(root: &Path, config: &Config) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            // Hidden directories include .git, .venv and .tox
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if Language::from_extension(ext).is_none() {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if config.is_path_excluded(relative) {
            tracing::debug!(path = %relative.display(), "excluded by configuration");
            continue;
        }

        files.push(path.to_path_buf());
    }

    Ok(files)
}

/// Run the batch command.
pub fn run_batch(args: &BatchArgs) -> anyhow::Result<i32> {
    let setup = match setup(&args.format, args.config.as_deref(), args.policy.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let metadata = match std::fs::metadata(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };

    let files = if metadata.is_dir() {
        collect_files(&args.path, &setup.config)?
    } else {
        vec![args.path.clone()]
    };

    if files.is_empty() {
        eprintln!("Warning: no files to analyze");
        return Ok(EXIT_SUCCESS);
    }

    let service = build_service(&setup.config)?;
    let runtime = async_runtime()?;
    let poll_interval = Duration::from_millis(setup.config.batch.poll_interval_ms);

    let entries = runtime.block_on(analyze_all(&service, &files, poll_interval))?;

    let root = args.path.to_string_lossy().to_string();
    match setup.format {
        Format::Json => report::write_batch_json(&entries)?,
        Format::Pretty => report::write_batch_pretty(
            &root,
            setup.config_path.as_deref(),
            setup.config.policy,
            &entries,
        ),
    }

    if entries.iter().any(|e| e.is_failed() || e.has_errors()) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Submit every file as a job, then wait for all of them.
///
/// A file that cannot be read gets a failed entry instead of a job, so the
/// other files are still reported.
async fn analyze_all(
    service: &AnalysisService,
    files: &[PathBuf],
    poll_interval: Duration,
) -> anyhow::Result<Vec<BatchEntry>> {
    let mut submitted = Vec::with_capacity(files.len());
    for path in files {
        let shown = path.to_string_lossy().to_string();
        let code = match tokio::fs::read_to_string(path).await {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(path = %shown, error = %e, "cannot read file");
                submitted.push((shown, Err(format!("cannot read file: {}", e))));
                continue;
            }
        };
        if code.is_empty() {
            tracing::debug!(path = %shown, "skipping empty file");
            continue;
        }
        let request = AnalysisRequest::new(code).file_name(shown.clone());
        let response = service.submit(request)?;
        submitted.push((shown, Ok(response.job_id)));
    }

    let progress = ProgressBar::new(submitted.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("  {spinner} [{bar:30}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let results: Vec<_> = stream::iter(submitted)
        .map(|(path, job_id)| {
            let progress = progress.clone();
            async move {
                let entry = match job_id {
                    Ok(job_id) => service
                        .wait(job_id, poll_interval)
                        .await
                        .map(|job| BatchEntry::submitted(path, job)),
                    Err(reason) => Ok(BatchEntry::unreadable(path, reason)),
                };
                progress.inc(1);
                entry
            }
        })
        .buffered(BATCH_CONCURRENCY)
        .collect()
        .await;
    progress.finish_and_clear();

    Ok(results.into_iter().collect::<Result<Vec<_>, _>>()?)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, DEFAULT_TEMPLATE) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Set model.endpoint to enable model-assisted analysis");
    println!("  2. Run: codesift analyze <file> --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use std::fs;

    #[test]
    fn test_default_template_is_valid() {
        let config = Config::parse_str(DEFAULT_TEMPLATE).unwrap();
        assert!(config::validate(&config).is_ok());
        assert_eq!(config.policy, PolicyMode::StaticOnly);
        assert_eq!(config.model.name, config::DEFAULT_MODEL_NAME);
    }

    #[test]
    fn test_collect_files_skips_hidden_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg/migrations")).unwrap();
        fs::create_dir_all(root.join(".venv/lib")).unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::write(root.join("pkg/app.py"), "x = 1\n").unwrap();
        fs::write(root.join("pkg/notes.txt"), "hello").unwrap();
        fs::write(root.join("pkg/migrations/0001.py"), "x = 1\n").unwrap();
        fs::write(root.join(".venv/lib/site.py"), "x = 1\n").unwrap();
        fs::write(root.join("__pycache__/app.py"), "x = 1\n").unwrap();

        let mut config = Config::default();
        config.batch.excluded_paths = vec!["**/migrations/**".to_string()];

        let files = collect_files(root, &config).unwrap();
        assert_eq!(files, vec![root.join("pkg/app.py")]);
    }

    fn fixture(path: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(path)
    }

    fn default_config_file(dir: &Path) -> PathBuf {
        let path = dir.join("codesift.yaml");
        fs::write(&path, DEFAULT_TEMPLATE).unwrap();
        path
    }

    #[test]
    fn test_collect_fixture_project() {
        let root = fixture("project");
        let config = Config::parse_str(DEFAULT_TEMPLATE).unwrap();
        let files = collect_files(&root, &config).unwrap();
        assert_eq!(
            files,
            vec![root.join("pkg/app.py"), root.join("pkg/broken.py")]
        );
    }

    #[test]
    fn test_analyze_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let config = default_config_file(dir.path());

        let args = |file: &str| AnalyzeArgs {
            file: fixture(file),
            file_type: None,
            format: "json".to_string(),
            config: Some(config.clone()),
            policy: None,
        };
        assert_eq!(run_analyze(&args("syntax_error.py")).unwrap(), EXIT_FAILED);
        assert_eq!(run_analyze(&args("undefined.py")).unwrap(), EXIT_SUCCESS);
        assert_eq!(run_analyze(&args("missing.py")).unwrap(), EXIT_ERROR);

        let mut bad_format = args("clean.py");
        bad_format.format = "sarif".to_string();
        assert_eq!(run_analyze(&bad_format).unwrap(), EXIT_ERROR);
    }

    #[test]
    fn test_batch_over_fixture_project() {
        let dir = tempfile::tempdir().unwrap();
        let args = BatchArgs {
            path: fixture("project"),
            format: "json".to_string(),
            config: Some(default_config_file(dir.path())),
            policy: None,
        };
        // pkg/broken.py has a syntax error
        assert_eq!(run_batch(&args).unwrap(), EXIT_FAILED);
    }

    #[test]
    fn test_batch_continues_past_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a_latin1.py"), b"name = '\xe9t\xe9'\n").unwrap();
        fs::write(root.join("b_ok.py"), "print('hello')\n").unwrap();

        let files = collect_files(&root, &Config::default()).unwrap();
        assert_eq!(files.len(), 2);

        let service = build_service(&Config::default()).unwrap();
        let entries = async_runtime()
            .unwrap()
            .block_on(analyze_all(&service, &files, Duration::from_millis(5)))
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].path.ends_with("a_latin1.py"));
        assert!(entries[0].job.is_none());
        assert!(entries[0].is_failed());
        assert!(entries[0]
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("cannot read file")));

        assert!(entries[1].path.ends_with("b_ok.py"));
        assert!(!entries[1].is_failed());
        assert!(!entries[1].has_errors());

        let args = BatchArgs {
            path: root,
            format: "json".to_string(),
            config: Some(default_config_file(dir.path())),
            policy: None,
        };
        assert_eq!(run_batch(&args).unwrap(), EXIT_FAILED);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested/codesift.yaml");

        assert_eq!(run_init(&InitArgs { output: output.clone() }).unwrap(), EXIT_SUCCESS);
        assert_eq!(fs::read_to_string(&output).unwrap(), DEFAULT_TEMPLATE);
        assert_eq!(run_init(&InitArgs { output }).unwrap(), EXIT_ERROR);
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "codesift", "-vv", "--log-json", "analyze", "a.py", "--format", "json", "--policy",
            "model-assisted",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.format, "json");
                assert_eq!(args.policy.as_deref(), Some("model-assisted"));
            }
            _ => panic!("expected analyze"),
        }
    }
}
