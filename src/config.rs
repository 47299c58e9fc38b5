//! Analyzer configuration.
//!
//! Configuration is an optional YAML file; every field has a default so an
//! absent file behaves the same as an empty one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::policy::PolicyMode;

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["codesift.yaml", ".codesift.yaml"];

/// Model used when neither the config file nor the environment names one.
pub const DEFAULT_MODEL_NAME: &str = "google/flan-t5-small";

/// Environment variable overriding `model.name`.
pub const ENV_MODEL_NAME: &str = "ANALYSIS_MODEL_NAME";

/// Environment variable overriding `model.endpoint`.
pub const ENV_MODEL_ENDPOINT: &str = "ANALYSIS_MODEL_ENDPOINT";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Whether static findings ever reach the model (default: static-only)
    #[serde(default)]
    pub policy: PolicyMode,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub checker: CheckerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse_str(&content)
    }

    /// Parse a configuration from YAML text. Empty text yields the defaults.
    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Locate and load the configuration.
    ///
    /// An explicit path must exist. Without one, the working directory and
    /// then the user config directory are searched; if nothing is found the
    /// defaults are used. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => discover(),
        };

        let mut config = match &path {
            Some(p) => Self::parse_file(p)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", p.display(), e))?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        validate(&config)?;

        Ok((config, path))
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_MODEL_NAME).filter(|v| !v.trim().is_empty()) {
            self.model.name = name;
        }
        if let Some(endpoint) = lookup(ENV_MODEL_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.model.endpoint = Some(endpoint);
        }
    }

    /// Check if a path should be excluded from batch runs.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.batch.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy();

        for pattern in &self.batch.excluded_paths {
            if let Ok(glob) = globset::Glob::new(pattern) {
                let matcher = glob.compile_matcher();
                if matcher.is_match(&*path_str) {
                    return true;
                }
            }
        }
        false
    }
}

/// Model gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Model identifier requested from the runtime
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Base URL of a text-generation server; unset means no model runtime
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-request timeout in milliseconds (default: 120000)
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Prompt tokens kept before truncation (default: 512)
    #[serde(default = "default_token_limit")]
    pub max_input_tokens: u32,
    /// Upper bound on generated tokens (default: 512)
    #[serde(default = "default_token_limit")]
    pub max_new_tokens: u32,
    /// Return static-only results when generation fails (default: true)
    #[serde(default = "default_true")]
    pub fallback_on_inference_failure: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            endpoint: None,
            timeout_ms: default_timeout(),
            max_input_tokens: default_token_limit(),
            max_new_tokens: default_token_limit(),
            fallback_on_inference_failure: true,
        }
    }
}

/// Static checker settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CheckerConfig {
    /// Names treated as always defined, on top of the built-in allow-list
    #[serde(default)]
    pub extra_builtins: Vec<String>,
    /// Treat function and lambda parameters as bindings
    #[serde(default)]
    pub bind_parameters: bool,
    /// Treat imported names as bindings
    #[serde(default)]
    pub bind_imports: bool,
}

/// Settings for the batch command.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Delay between job status polls in milliseconds (default: 100)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Glob patterns for paths to skip (e.g., "**/migrations/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            excluded_paths: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_timeout() -> u64 {
    120_000
}

fn default_token_limit() -> u32 {
    512
}

fn default_poll_interval() -> u64 {
    100
}

/// Discover a configuration file.
fn discover() -> Option<PathBuf> {
    for name in DEFAULT_CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Some(path);
        }
    }

    directories::ProjectDirs::from("", "", "codesift")
        .map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_NAMES[0]))
        .filter(|p| p.exists())
}

/// Validate a configuration for correctness.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    if config.model.name.trim().is_empty() {
        anyhow::bail!("model.name must not be empty");
    }
    if config.model.max_input_tokens == 0 {
        anyhow::bail!("model.max_input_tokens must be greater than 0");
    }
    if config.model.max_new_tokens == 0 {
        anyhow::bail!("model.max_new_tokens must be greater than 0");
    }
    if config.model.timeout_ms == 0 {
        anyhow::bail!("model.timeout_ms must be greater than 0");
    }

    if let Some(endpoint) = &config.model.endpoint {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("invalid model.endpoint {:?}: {}", endpoint, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("model.endpoint must use http or https, got {:?}", url.scheme());
        }
    }

    if config.batch.poll_interval_ms == 0 {
        anyhow::bail!("batch.poll_interval_ms must be greater than 0");
    }

    for pattern in &config.batch.excluded_paths {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    Ok(())
}
