use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Embedding, EmbeddingError, EmbeddingProvider, normalize};
use crate::constants::{DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL};
use crate::provider::{ProviderError, TokenUsage};

/// Connection settings for [`OpenAiEmbedder`].
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Base URL without the trailing `/embeddings`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
    /// Client-side timeout; the ledger applies its own on top.
    pub timeout: Duration,
}

impl EmbedderConfig {
    pub const ENV_API_KEY: &'static str = "OPENAI_API_KEY";

    /// Builds a config with the API key taken from `OPENAI_API_KEY`.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var(Self::ENV_API_KEY)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::MissingApiKey {
                var: Self::ENV_API_KEY,
            })?;

        Ok(Self {
            base_url: base_url.into(),
            api_key,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIM,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::InvalidConfig {
                reason: "dimension must be > 0".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig {
                reason: "model must not be empty".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(EmbeddingError::InvalidConfig {
                reason: format!("base_url must be http(s): {}", self.base_url),
            });
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    prompt_tokens: u64,
}

/// Embedder for any server speaking the OpenAI `/embeddings` protocol.
pub struct OpenAiEmbedder {
    client: Client,
    config: EmbedderConfig,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

impl OpenAiEmbedder {
    pub fn new(config: EmbedderConfig) -> Result<Self, EmbeddingError> {
        config.validate()?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    #[instrument(skip(self, text), fields(model = %self.config.model, text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
            dimensions: self.config.dimension,
        };

        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let mut vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Malformed("embedding response had no data".into()))?;

        if vector.len() != self.config.dimension {
            return Err(ProviderError::Malformed(format!(
                "expected {} dimensions, got {}",
                self.config.dimension,
                vector.len()
            )));
        }
        normalize(&mut vector);

        let input_tokens = parsed.usage.map(|u| u.prompt_tokens).unwrap_or(0);
        debug!(input_tokens, "embedding received");

        Ok(Embedding {
            vector,
            usage: TokenUsage::new(input_tokens, 0),
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
