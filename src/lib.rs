//! codesift - source analysis pipeline.
//!
//! A submission is checked by a deterministic static checker first. Syntax
//! errors, possibly-undefined names and clean results are answered
//! directly; depending on the configured policy, a generative model may be
//! consulted and its free-text answer is recovered, normalized and merged
//! with the static findings.
//!
//! # Architecture
//!
//! - `checker`: tree-sitter syntax check and flat scope check
//! - `policy`: short-circuit decision over static findings
//! - `gateway`: lazily acquired model runtime and prompt contract
//! - `extract`: tolerant JSON recovery from generated text
//! - `normalize`: canonical findings and report merging
//! - `pipeline`: the full analysis run
//! - `jobs`: background execution with polled status
//! - `service`: typed request/response entry points
//! - `config`, `report`, `telemetry`, `cli`: the command-line surface

pub mod checker;
pub mod cli;
pub mod config;
pub mod extract;
pub mod finding;
pub mod gateway;
pub mod jobs;
pub mod normalize;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod service;
pub mod telemetry;

pub use checker::{Language, StaticChecker, StaticFindings};
pub use config::Config;
pub use finding::{AnalysisReport, Finding, Severity};
pub use gateway::{
    Architecture, GatewayError, GenerationParams, HttpRuntime, LoadedModel, ModelGateway,
    ModelRuntime,
};
pub use jobs::{Job, JobError, JobId, JobOrchestrator, JobRegistry, JobStatus};
pub use pipeline::{AnalysisError, Analyzer};
pub use policy::{Decision, PolicyMode};
pub use service::{AnalysisRequest, AnalysisService, AnalyzeResponse, ServiceError, SubmitResponse};
