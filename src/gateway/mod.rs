//! Model gateway: lazy acquisition of a text-generation model and
//! off-executor generation.
//!
//! The gateway owns the acquired model. Acquisition happens on first use,
//! is shared by concurrent callers and is retried on the next call if it
//! fails. Generation is synchronous in the runtime contract, so it always
//! runs on Tokio's blocking pool.

mod http;
mod prompt;

pub use http::HttpRuntime;
pub use prompt::build_prompt;

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::ModelConfig;

/// Errors surfaced by a model runtime or the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

impl GatewayError {
    fn into_inference(self) -> Self {
        match self {
            GatewayError::ModelUnavailable(msg) => GatewayError::InferenceFailure(msg),
            other => other,
        }
    }
}

/// Model architecture requested from a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Encoder-decoder model (text2text generation).
    Seq2Seq,
    /// Decoder-only model (text generation).
    Causal,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Seq2Seq => "seq2seq",
            Architecture::Causal => "causal",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoding parameters passed to every generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    /// Prompt tokens kept; longer prompts are truncated.
    pub max_input_tokens: u32,
    pub max_new_tokens: u32,
    pub do_sample: bool,
    pub num_beams: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_input_tokens: 512,
            max_new_tokens: 512,
            do_sample: false,
            num_beams: 1,
        }
    }
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_input_tokens: config.max_input_tokens,
            max_new_tokens: config.max_new_tokens,
            ..Self::default()
        }
    }
}

/// A source of loadable models.
pub trait ModelRuntime: Send + Sync {
    fn load(&self, model_name: &str, arch: Architecture)
        -> Result<Arc<dyn LoadedModel>, GatewayError>;
}

/// A loaded model ready to generate text.
pub trait LoadedModel: Send + Sync {
    /// Generate a completion. Blocking.
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GatewayError>;
}

/// Owned handle to the lazily acquired model.
pub struct ModelGateway {
    runtime: Arc<dyn ModelRuntime>,
    model_name: String,
    params: GenerationParams,
    model: OnceCell<Arc<dyn LoadedModel>>,
}

impl ModelGateway {
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        model_name: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            runtime,
            model_name: model_name.into(),
            params,
            model: OnceCell::new(),
        }
    }

    pub fn from_config(runtime: Arc<dyn ModelRuntime>, config: &ModelConfig) -> Self {
        Self::new(runtime, config.name.clone(), GenerationParams::from(config))
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether a model has been acquired.
    pub fn is_acquired(&self) -> bool {
        self.model.initialized()
    }

    /// Acquire the model, loading it on first use.
    pub async fn acquire(&self) -> Result<Arc<dyn LoadedModel>, GatewayError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let runtime = Arc::clone(&self.runtime);
                let name = self.model_name.clone();
                tokio::task::spawn_blocking(move || load_any(runtime.as_ref(), &name))
                    .await
                    .map_err(|e| {
                        GatewayError::ModelUnavailable(format!("model loading task failed: {}", e))
                    })?
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// Build the prompt for `code` and generate a completion.
    pub async fn analyze(&self, code: &str) -> Result<String, GatewayError> {
        self.generate(build_prompt(code)).await
    }

    /// Generate a completion for `prompt` on the blocking pool.
    pub async fn generate(&self, prompt: String) -> Result<String, GatewayError> {
        let model = self.acquire().await?;
        let params = self.params.clone();
        let started = Instant::now();

        let output = tokio::task::spawn_blocking(move || model.generate(&prompt, &params))
            .await
            .map_err(|e| GatewayError::InferenceFailure(format!("generation task failed: {}", e)))?
            .map_err(GatewayError::into_inference)?;

        tracing::debug!(
            model = %self.model_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_len = output.len(),
            "generation complete"
        );
        Ok(output)
    }
}

/// Try a sequence-to-sequence model, then a causal one.
fn load_any(runtime: &dyn ModelRuntime, name: &str) -> Result<Arc<dyn LoadedModel>, GatewayError> {
    let mut reasons = Vec::new();

    for arch in [Architecture::Seq2Seq, Architecture::Causal] {
        match runtime.load(name, arch) {
            Ok(model) => {
                tracing::info!(model = %name, arch = %arch, "model acquired");
                return Ok(model);
            }
            Err(e) => {
                tracing::debug!(model = %name, arch = %arch, error = %e, "model load failed");
                reasons.push(format!("{}: {}", arch, e));
            }
        }
    }

    Err(GatewayError::ModelUnavailable(reasons.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Echo;

    impl LoadedModel for Echo {
        fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GatewayError> {
            Ok(format!("{}:{}", params.max_new_tokens, prompt.len()))
        }
    }

    /// Loads only the listed architectures and records every attempt.
    struct Picky {
        accepts: Vec<Architecture>,
        attempts: Mutex<Vec<Architecture>>,
    }

    impl Picky {
        fn new(accepts: Vec<Architecture>) -> Self {
            Self {
                accepts,
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    impl ModelRuntime for Picky {
        fn load(&self, _: &str, arch: Architecture) -> Result<Arc<dyn LoadedModel>, GatewayError> {
            self.attempts.lock().unwrap().push(arch);
            if self.accepts.contains(&arch) {
                Ok(Arc::new(Echo))
            } else {
                Err(GatewayError::ModelUnavailable(format!("no {} weights", arch)))
            }
        }
    }

    struct Panicking;

    impl LoadedModel for Panicking {
        fn generate(&self, _: &str, _: &GenerationParams) -> Result<String, GatewayError> {
            panic!("decoder exploded")
        }
    }

    struct PanickingRuntime;

    impl ModelRuntime for PanickingRuntime {
        fn load(&self, _: &str, _: Architecture) -> Result<Arc<dyn LoadedModel>, GatewayError> {
            Ok(Arc::new(Panicking))
        }
    }

    struct Flaky {
        calls: AtomicUsize,
    }

    impl ModelRuntime for Flaky {
        fn load(&self, _: &str, _: Architecture) -> Result<Arc<dyn LoadedModel>, GatewayError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GatewayError::ModelUnavailable("warming up".into()))
            } else {
                Ok(Arc::new(Echo))
            }
        }
    }

    #[tokio::test]
    async fn test_prefers_seq2seq() {
        let runtime = Arc::new(Picky::new(vec![Architecture::Seq2Seq, Architecture::Causal]));
        let gateway = ModelGateway::new(runtime.clone(), "m", GenerationParams::default());
        gateway.acquire().await.unwrap();
        assert_eq!(*runtime.attempts.lock().unwrap(), vec![Architecture::Seq2Seq]);
    }

    #[tokio::test]
    async fn test_falls_back_to_causal() {
        let runtime = Arc::new(Picky::new(vec![Architecture::Causal]));
        let gateway = ModelGateway::new(runtime.clone(), "m", GenerationParams::default());
        assert_eq!(gateway.generate("abc".into()).await.unwrap(), "512:3");
        assert_eq!(
            *runtime.attempts.lock().unwrap(),
            vec![Architecture::Seq2Seq, Architecture::Causal]
        );
    }

    #[tokio::test]
    async fn test_unavailable_carries_both_reasons() {
        let gateway =
            ModelGateway::new(Arc::new(Picky::new(vec![])), "m", GenerationParams::default());
        match gateway.acquire().await {
            Err(GatewayError::ModelUnavailable(msg)) => {
                assert!(msg.contains("seq2seq: model unavailable: no seq2seq weights"));
                assert!(msg.contains("causal: model unavailable: no causal weights"));
            }
            other => panic!("expected unavailable, got {:?}", other.map(|_| ())),
        }
        assert!(!gateway.is_acquired());
    }

    #[tokio::test]
    async fn test_failed_acquisition_is_retried() {
        let runtime = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
        });
        let gateway = ModelGateway::new(runtime.clone(), "m", GenerationParams::default());
        assert!(gateway.acquire().await.is_err());
        assert!(gateway.acquire().await.is_ok());
        assert!(gateway.acquire().await.is_ok());
        // two failed architectures, then one success, then cached
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_loads_once() {
        let runtime = Arc::new(Picky::new(vec![Architecture::Seq2Seq]));
        let gateway = Arc::new(ModelGateway::new(
            runtime.clone(),
            "m",
            GenerationParams::default(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gateway = Arc::clone(&gateway);
                tokio::spawn(async move { gateway.analyze("x = 1").await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(runtime.attempts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_inference_failure() {
        let gateway =
            ModelGateway::new(Arc::new(PanickingRuntime), "m", GenerationParams::default());
        match gateway.generate("p".into()).await {
            Err(GatewayError::InferenceFailure(msg)) => {
                assert!(msg.starts_with("generation task failed"))
            }
            other => panic!("expected inference failure, got {:?}", other),
        }
    }

    #[test]
    fn test_params_from_config() {
        let config = ModelConfig {
            max_new_tokens: 64,
            ..ModelConfig::default()
        };
        let params = GenerationParams::from(&config);
        assert_eq!(params.max_new_tokens, 64);
        assert_eq!(params.max_input_tokens, 512);
        assert!(!params.do_sample);
        assert_eq!(params.num_beams, 1);
    }
}
