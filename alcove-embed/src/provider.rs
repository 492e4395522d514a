//! The embedding provider trait and shared types.

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The closed set of local AI providers Alcove can talk to.
///
/// Selected once at startup from configuration; both the embedding and the
/// chat side key their endpoint and wire format off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "lmstudio")]
    LmStudio,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl ProviderKind {
    /// Default API base URL for the provider, matching its stock install.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::LmStudio => "http://localhost:1234/v1",
            Self::Ollama => "http://localhost:11434",
            Self::OpenAiCompatible => "http://localhost:8000/v1",
        }
    }

    /// Whether the provider speaks the OpenAI wire format (LM Studio does).
    pub fn is_openai_style(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lmstudio" | "lm_studio" | "lm-studio" => Ok(Self::LmStudio),
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai_compatible" | "openai-compatible" => Ok(Self::OpenAiCompatible),
            other => Err(EmbedError::invalid_config(format!(
                "unknown provider kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LmStudio => "lmstudio",
            Self::Ollama => "ollama",
            Self::OpenAiCompatible => "openai_compatible",
        };
        f.write_str(name)
    }
}

/// Result of a batch embedding call: one vector per input text.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f32>>,
    /// Dimension of each vector (0 when the result is empty).
    pub dimension: usize,
}

impl EmbeddingResult {
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Capability of turning texts into fixed-dimension vectors.
///
/// Implementations must be deterministic for a fixed model identity: the
/// same input and model version yield the same vector. That property is what
/// makes reindexing idempotent and embedding retries safe.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let result = self.embed_texts(std::slice::from_ref(&text.to_string())).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::malformed("no embedding returned for text"))
    }

    /// Dimension of produced vectors; 0 until known.
    fn embedding_dimension(&self) -> usize;

    /// Identity of the model behind this provider, for cache validity.
    fn model_id(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parsing() {
        assert_eq!("lmstudio".parse::<ProviderKind>().unwrap(), ProviderKind::LmStudio);
        assert_eq!("OLLAMA".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!(
            "openai-compatible".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAiCompatible
        );
        assert!("watsonx".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn default_urls_match_stock_installs() {
        assert_eq!(ProviderKind::LmStudio.default_base_url(), "http://localhost:1234/v1");
        assert_eq!(ProviderKind::Ollama.default_base_url(), "http://localhost:11434");
        assert!(ProviderKind::LmStudio.is_openai_style());
        assert!(!ProviderKind::Ollama.is_openai_style());
    }

    #[test]
    fn embedding_result_dimension() {
        let result = EmbeddingResult::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());

        let empty = EmbeddingResult::new(vec![]);
        assert_eq!(empty.dimension, 0);
        assert!(empty.is_empty());
    }
}
