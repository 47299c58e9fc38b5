//! In-memory model runtimes shared by the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use codesift::checker::StaticChecker;
use codesift::gateway::{
    Architecture, GatewayError, GenerationParams, LoadedModel, ModelGateway, ModelRuntime,
};
use codesift::pipeline::Analyzer;
use codesift::policy::PolicyMode;

pub fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(testdata_path().join(name)).expect("fixture should exist")
}

#[derive(Clone)]
enum Behavior {
    Reply(String),
    Unavailable,
    Fail,
    Panic,
}

/// Scriptable runtime that counts every load and generation.
pub struct FakeRuntime {
    behavior: Behavior,
    loads: AtomicUsize,
    generations: Arc<AtomicUsize>,
}

impl FakeRuntime {
    fn with(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            loads: AtomicUsize::new(0),
            generations: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Always generates `text`.
    pub fn reply(text: &str) -> Arc<Self> {
        Self::with(Behavior::Reply(text.to_string()))
    }

    /// Every load fails.
    pub fn unavailable() -> Arc<Self> {
        Self::with(Behavior::Unavailable)
    }

    /// Loads succeed; generation returns an error.
    pub fn failing() -> Arc<Self> {
        Self::with(Behavior::Fail)
    }

    /// Loads succeed; generation panics.
    pub fn panicking() -> Arc<Self> {
        Self::with(Behavior::Panic)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    /// Total number of times the runtime was touched.
    pub fn calls(&self) -> usize {
        self.loads() + self.generations()
    }
}

impl ModelRuntime for FakeRuntime {
    fn load(&self, _: &str, arch: Architecture) -> Result<Arc<dyn LoadedModel>, GatewayError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Unavailable => Err(GatewayError::ModelUnavailable(format!(
                "no {} weights",
                arch
            ))),
            _ => Ok(Arc::new(FakeModel {
                behavior: self.behavior.clone(),
                generations: Arc::clone(&self.generations),
            })),
        }
    }
}

struct FakeModel {
    behavior: Behavior,
    generations: Arc<AtomicUsize>,
}

impl LoadedModel for FakeModel {
    fn generate(&self, _: &str, _: &GenerationParams) -> Result<String, GatewayError> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Reply(text) => Ok(text.clone()),
            Behavior::Fail => Err(GatewayError::InferenceFailure("CUDA out of memory".into())),
            Behavior::Panic => panic!("decoder state corrupted"),
            Behavior::Unavailable => Err(GatewayError::ModelUnavailable("gone".into())),
        }
    }
}

/// Analyzer over the default checker and the given runtime.
pub fn analyzer(runtime: &Arc<FakeRuntime>, policy: PolicyMode) -> Analyzer {
    let runtime: Arc<dyn ModelRuntime> = runtime.clone();
    Analyzer::new(
        StaticChecker::default(),
        policy,
        ModelGateway::new(runtime, "fake/model", GenerationParams::default()),
    )
}
