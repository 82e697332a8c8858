//! Ollama backend: chat completions through rig's Ollama provider.
//!
//! The availability probe hits the server root directly; rig has no
//! equivalent call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::client::{CompletionClient, Nothing};
use rig::providers::ollama;
use tracing::{debug, error, info};

use crate::config::OllamaConfig;
use crate::error::LlmError;
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider, RigAdapter};

const PROVIDER: &str = "ollama";

/// Timeout for the availability probe, independent of the completion timeout.
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sampling temperature used when the request does not set one.
const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Client for a local Ollama server.
pub struct OllamaProvider {
    api_url: String,
    model: String,
    timeout: Duration,
    inner: Arc<dyn LlmProvider>,
    http: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.trim_end_matches('/').to_string();

        let client: ollama::Client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(root_url(&api_url))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to create Ollama client: {e}"),
            })?;
        let model = client.completion_model(&config.model);

        debug!(model = %config.model, url = %api_url, "Initialized Ollama provider");

        Ok(Self {
            api_url,
            model: config.model.clone(),
            timeout: config.timeout,
            inner: Arc::new(RigAdapter::new(model, &config.model)),
            http: reqwest::Client::new(),
        })
    }

    /// Probe the server root. Any transport error or non-200 counts as down.
    pub async fn check_availability(&self) -> bool {
        let url = format!("{}/", root_url(&self.api_url));
        let result = self
            .http
            .get(&url)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                info!(url = %url, "Ollama API is available");
                true
            }
            Ok(resp) => {
                error!(url = %url, status = %resp.status(), "Ollama API returned unexpected status");
                false
            }
            Err(e) => {
                error!(url = %url, error = %e, "Error connecting to Ollama API");
                false
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        request.temperature.get_or_insert(DEFAULT_TEMPERATURE);

        debug!(model = %self.model, prompt_len = request.prompt_text().len(), "Sending Ollama chat request");

        let response = tokio::time::timeout(self.timeout, self.inner.complete(request))
            .await
            .map_err(|_| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("no response within {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| {
                error!(model = %self.model, error = %e, "Ollama API error");
                match e {
                    LlmError::RequestFailed { reason, .. } => LlmError::RequestFailed {
                        provider: PROVIDER.into(),
                        reason,
                    },
                    other => other,
                }
            })?;

        Ok(response)
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.check_availability().await {
            Ok(())
        } else {
            Err(LlmError::Unavailable {
                provider: PROVIDER.into(),
                url: self.api_url.clone(),
            })
        }
    }
}

/// Server root for an API base like `http://host:11434/api`.
fn root_url(api_url: &str) -> &str {
    let trimmed = api_url.trim_end_matches('/');
    trimmed.strip_suffix("/api").unwrap_or(trimmed)
}
