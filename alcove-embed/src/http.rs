//! HTTP embedding provider for LM Studio, Ollama, and OpenAI-compatible
//! servers.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, ProviderKind};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Configuration for [`HttpEmbeddingProvider`].
#[derive(Debug, Clone)]
pub struct EmbedHttpConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Max texts per request; larger inputs are split into batches.
    pub batch_size: usize,
}

impl EmbedHttpConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: kind.default_base_url().to_string(),
            api_key: None,
            model: model.into(),
            timeout: Duration::from_secs(60),
            batch_size: 16,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("embedding model is empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(EmbedError::invalid_config("base URL is empty"));
        }
        Ok(())
    }

    fn embeddings_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.kind.is_openai_style() {
            format!("{base}/embeddings")
        } else {
            format!("{base}/api/embed")
        }
    }
}

/// Embedding provider backed by a local HTTP inference server.
///
/// The vector dimension is not known until the first successful call; it is
/// cached afterwards so callers can size buffers without re-asking the
/// server.
pub struct HttpEmbeddingProvider {
    config: EmbedHttpConfig,
    client: reqwest::Client,
    dimension: AtomicUsize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: EmbedHttpConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            dimension: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &EmbedHttpConfig {
        &self.config
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Both wire formats accept {model, input}; they differ in the
        // response shape and the endpoint path.
        let body = json!({ "model": &self.config.model, "input": texts });

        let mut request = self.client.post(self.config.embeddings_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let payload = response.text().await?;
        let embeddings = if self.config.kind.is_openai_style() {
            parse_openai_embeddings(&payload)?
        } else {
            parse_ollama_embeddings(&payload)?
        };

        if embeddings.len() != texts.len() {
            return Err(EmbedError::malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(Vec::new()));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            debug!(batch_len = batch.len(), model = %self.config.model, "embedding batch");
            embeddings.extend(self.embed_batch(batch).await?);
        }

        let result = EmbeddingResult::new(embeddings);
        if result.dimension > 0 {
            self.dimension.store(result.dimension, Ordering::Relaxed);
        }
        Ok(result)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn model_id(&self) -> String {
        format!("{}/{}", self.config.kind, self.config.model)
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingsResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Parse an OpenAI-style `/embeddings` response body. Items are re-sorted by
/// their `index` field since the API does not guarantee order.
pub fn parse_openai_embeddings(body: &str) -> Result<Vec<Vec<f32>>> {
    let response: OpenAiEmbeddingsResponse = serde_json::from_str(body)
        .map_err(|e| EmbedError::malformed(format!("bad embeddings payload: {e}")))?;
    let mut items = response.data;
    items.sort_by_key(|item| item.index);
    Ok(items.into_iter().map(|item| item.embedding).collect())
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Parse an Ollama `/api/embed` response body.
pub fn parse_ollama_embeddings(body: &str) -> Result<Vec<Vec<f32>>> {
    let response: OllamaEmbedResponse = serde_json::from_str(body)
        .map_err(|e| EmbedError::malformed(format!("bad embed payload: {e}")))?;
    Ok(response.embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_response_parses_and_reorders() {
        let body = r#"{
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.4, 0.5]},
                {"object": "embedding", "index": 0, "embedding": [0.1, 0.2]}
            ],
            "model": "nomic-embed-text",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let embeddings = parse_openai_embeddings(body).unwrap();
        assert_eq!(embeddings, vec![vec![0.1, 0.2], vec![0.4, 0.5]]);
    }

    #[test]
    fn ollama_response_parses() {
        let body = r#"{
            "model": "nomic-embed-text",
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        }"#;
        let embeddings = parse_ollama_embeddings(body).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 3);
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert!(parse_openai_embeddings("not json").is_err());
        assert!(parse_openai_embeddings(r#"{"data": "wrong"}"#).is_err());
        assert!(parse_ollama_embeddings(r#"{"embedding": [0.1]}"#).is_err());
    }

    #[test]
    fn config_builders_and_urls() {
        let config = EmbedHttpConfig::new(ProviderKind::LmStudio, "nomic-embed-text")
            .with_timeout(Duration::from_secs(10))
            .with_batch_size(4);
        assert_eq!(config.embeddings_url(), "http://localhost:1234/v1/embeddings");
        assert_eq!(config.batch_size, 4);

        let ollama = EmbedHttpConfig::new(ProviderKind::Ollama, "nomic-embed-text")
            .with_base_url("http://127.0.0.1:11434/");
        assert_eq!(ollama.embeddings_url(), "http://127.0.0.1:11434/api/embed");
    }

    #[test]
    fn empty_model_is_invalid() {
        let config = EmbedHttpConfig::new(ProviderKind::Ollama, "  ");
        assert!(HttpEmbeddingProvider::new(config).is_err());
    }
}
