//! Model runtime backed by a text-generation-inference style HTTP server.
//!
//! Architecture is read from: GET {endpoint}/info
//! Generation runs via:       POST {endpoint}/generate

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{Architecture, GatewayError, GenerationParams, LoadedModel, ModelRuntime};

/// Runtime that loads models served over HTTP.
///
/// Calls are made from blocking threads, so each request is driven to
/// completion on the ambient Tokio runtime handle.
#[derive(Debug, Clone)]
pub struct HttpRuntime {
    http: Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl HttpRuntime {
    /// Create a runtime. Without an endpoint every load is unavailable.
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("codesift/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            timeout,
        })
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    model_pipeline_tag: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Debug, Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    do_sample: bool,
    truncate: u32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generated {
    generated_text: String,
}

/// Servers answer with either one object or a one-element list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Single(Generated),
    Batch(Vec<Generated>),
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        match self {
            GenerateResponse::Single(g) => Some(g.generated_text),
            GenerateResponse::Batch(items) => items.into_iter().next().map(|g| g.generated_text),
        }
    }
}

/// Map a server pipeline tag to an architecture.
fn architecture_for_tag(tag: &str) -> Option<Architecture> {
    match tag {
        "text2text-generation" => Some(Architecture::Seq2Seq),
        "text-generation" => Some(Architecture::Causal),
        _ => None,
    }
}

fn runtime_handle() -> Result<tokio::runtime::Handle, String> {
    tokio::runtime::Handle::try_current().map_err(|e| format!("no async runtime: {}", e))
}

fn describe(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else {
        format!("network error: {}", e)
    }
}

impl ModelRuntime for HttpRuntime {
    fn load(
        &self,
        model_name: &str,
        arch: Architecture,
    ) -> Result<Arc<dyn LoadedModel>, GatewayError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| GatewayError::ModelUnavailable("no model endpoint configured".into()))?;
        let handle = runtime_handle().map_err(GatewayError::ModelUnavailable)?;
        let url = format!("{}/info", endpoint);

        let info: InfoResponse = handle
            .block_on(async {
                let response = self
                    .http
                    .get(&url)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(describe)?;
                if !response.status().is_success() {
                    return Err(format!("HTTP {} from {}", response.status().as_u16(), url));
                }
                response
                    .json::<InfoResponse>()
                    .await
                    .map_err(|e| format!("invalid info response: {}", e))
            })
            .map_err(GatewayError::ModelUnavailable)?;

        let served = info
            .model_pipeline_tag
            .as_deref()
            .and_then(architecture_for_tag);
        if served != Some(arch) {
            return Err(GatewayError::ModelUnavailable(format!(
                "server pipeline is {:?}, not {}",
                info.model_pipeline_tag.as_deref().unwrap_or("unknown"),
                arch
            )));
        }

        if let Some(served_id) = info.model_id.as_deref() {
            if served_id != model_name {
                tracing::warn!(
                    requested = %model_name,
                    served = %served_id,
                    "endpoint serves a different model than configured"
                );
            }
        }

        Ok(Arc::new(HttpModel {
            http: self.http.clone(),
            url: format!("{}/generate", endpoint),
            timeout: self.timeout,
        }))
    }
}

/// A model bound to a generation endpoint.
struct HttpModel {
    http: Client,
    url: String,
    timeout: Duration,
}

impl LoadedModel for HttpModel {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, GatewayError> {
        let handle = runtime_handle().map_err(GatewayError::InferenceFailure)?;
        let body = GenerateRequest {
            inputs: prompt,
            parameters: GenerateParameters {
                max_new_tokens: params.max_new_tokens,
                do_sample: params.do_sample,
                truncate: params.max_input_tokens,
                return_full_text: false,
            },
        };

        handle
            .block_on(async {
                let response = self
                    .http
                    .post(&self.url)
                    .timeout(self.timeout)
                    .json(&body)
                    .send()
                    .await
                    .map_err(describe)?;

                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(format!("HTTP {}: {}", status.as_u16(), text.trim()));
                }

                let parsed: GenerateResponse = response
                    .json()
                    .await
                    .map_err(|e| format!("invalid generate response: {}", e))?;
                parsed
                    .into_text()
                    .ok_or_else(|| "empty generate response".to_string())
            })
            .map_err(GatewayError::InferenceFailure)
    }
}
