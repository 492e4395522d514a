//! TOML configuration for the whole system.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration pointed at `./documents` and a local Ollama. The
//! config is constructed once at startup and handed to each component as
//! its own typed config value; nothing reads it globally afterwards.

use crate::history::ConversationHistory;
use crate::http::ChatHttpConfig;
use crate::orchestrator::{DEFAULT_SYSTEM_PROMPT, OrchestratorConfig};
use alcove_context::ChunkingConfig;
use alcove_embed::{EmbedHttpConfig, ProviderKind};
use alcove_retriever::retrieval::indexing_engine::IndexingEngineConfig;
use alcove_retriever::retrieval::planner::RetrievalConfig;
use alcove_retriever::storage::{SimilarityMetric, VectorStoreConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlcoveConfig {
    pub documents: DocumentsConfig,
    pub chunking: ChunkingSection,
    pub provider: ProviderSection,
    pub embedding: EmbeddingSection,
    pub chat: ChatSection,
    pub retrieval: RetrievalSection,
    pub indexing: IndexingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentsConfig {
    /// Folder of documents to index.
    pub root: PathBuf,
    /// Where the paired index files live.
    pub index_dir: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./documents"),
            index_dir: PathBuf::from("./.alcove"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkingSection {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    /// Overrides the kind's default base URL when set.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: None,
            api_key: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingSection {
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatSection {
    pub model: String,
    pub system_prompt: Option<String>,
    /// Recent turns offered to each prompt.
    pub history_turns: usize,
    /// Storage bounds for the full conversation history.
    pub max_history_turns: usize,
    pub max_history_chars: usize,
    pub prompt_char_budget: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            model: "llama3.1:8b".to_string(),
            system_prompt: None,
            history_turns: 6,
            max_history_turns: 40,
            max_history_chars: 60_000,
            prompt_char_budget: 12_000,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalSection {
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub per_doc_cap: usize,
    pub similarity: SimilarityMetric,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
            per_doc_cap: 2,
            similarity: SimilarityMetric::Cosine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexingSection {
    pub workers: usize,
    pub embed_attempts: u32,
    pub retry_base_ms: u64,
}

impl Default for IndexingSection {
    fn default() -> Self {
        Self {
            workers: 4,
            embed_attempts: 3,
            retry_base_ms: 100,
        }
    }
}

impl AlcoveConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("parsing configuration")
    }

    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    fn base_url(&self) -> String {
        self.provider
            .base_url
            .clone()
            .unwrap_or_else(|| self.provider.kind.default_base_url().to_string())
    }

    pub fn embed_http_config(&self) -> EmbedHttpConfig {
        let mut config = EmbedHttpConfig::new(self.provider.kind, &self.embedding.model)
            .with_base_url(self.base_url())
            .with_timeout(Duration::from_secs(self.provider.timeout_secs))
            .with_batch_size(self.embedding.batch_size);
        if let Some(key) = &self.provider.api_key {
            config = config.with_api_key(key);
        }
        config
    }

    pub fn chat_http_config(&self) -> ChatHttpConfig {
        let mut config = ChatHttpConfig::new(self.provider.kind, &self.chat.model)
            .with_base_url(self.base_url())
            .with_timeout(Duration::from_secs(self.provider.timeout_secs));
        if let Some(key) = &self.provider.api_key {
            config = config.with_api_key(key);
        }
        config
    }

    pub fn vector_store_config(&self) -> VectorStoreConfig {
        VectorStoreConfig::on_disk(&self.documents.index_dir, self.retrieval.similarity)
    }

    pub fn engine_config(&self) -> Result<IndexingEngineConfig> {
        let chunking = ChunkingConfig::new(self.chunking.chunk_size, self.chunking.overlap)
            .map_err(anyhow::Error::msg)?;
        Ok(IndexingEngineConfig::new(&self.documents.root)
            .with_chunking(chunking)
            .with_max_workers(self.indexing.workers)
            .with_embed_retries(
                self.indexing.embed_attempts,
                Duration::from_millis(self.indexing.retry_base_ms),
            ))
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            top_k: self.retrieval.top_k,
            min_score: self.retrieval.min_score,
            per_doc_cap: self.retrieval.per_doc_cap,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            system_prompt: self
                .chat
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            prompt_char_budget: self.chat.prompt_char_budget,
            history_turns: self.chat.history_turns,
            temperature: self.chat.temperature,
            max_tokens: self.chat.max_tokens,
        }
    }

    pub fn conversation_history(&self) -> ConversationHistory {
        ConversationHistory::new(self.chat.max_history_turns, self.chat.max_history_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_the_default() {
        let config = AlcoveConfig::from_toml_str("").unwrap();
        assert_eq!(config, AlcoveConfig::default());
        assert_eq!(config.provider.kind, ProviderKind::Ollama);
        assert_eq!(config.chunking.chunk_size, 512);
    }

    #[test]
    fn sections_override_independently() {
        let raw = r#"
            [documents]
            root = "/srv/notes"

            [provider]
            kind = "lmstudio"
            timeout_secs = 30

            [chat]
            model = "qwen-2.5"
            temperature = 0.3

            [retrieval]
            top_k = 8
            min_score = 0.6
        "#;
        let config = AlcoveConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.documents.root, PathBuf::from("/srv/notes"));
        assert_eq!(config.provider.kind, ProviderKind::LmStudio);
        assert_eq!(config.chat.model, "qwen-2.5");
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.min_score, Some(0.6));
        // untouched sections keep defaults
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.indexing.workers, 4);
    }

    #[test]
    fn base_url_defaults_follow_provider_kind() {
        let config = AlcoveConfig::from_toml_str("[provider]\nkind = \"lmstudio\"").unwrap();
        assert_eq!(
            config.chat_http_config().base_url,
            "http://localhost:1234/v1"
        );

        let overridden =
            AlcoveConfig::from_toml_str("[provider]\nbase_url = \"http://10.0.0.2:11434\"")
                .unwrap();
        assert_eq!(
            overridden.embed_http_config().base_url,
            "http://10.0.0.2:11434"
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(AlcoveConfig::from_toml_str("[documents]\nroot_dir = \"x\"").is_err());
        assert!(AlcoveConfig::from_toml_str("[typo_section]\nx = 1").is_err());
    }

    #[test]
    fn invalid_chunking_is_caught_at_engine_config() {
        let config = AlcoveConfig::from_toml_str("[chunking]\nchunk_size = 10\noverlap = 10")
            .unwrap();
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlcoveConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AlcoveConfig::default());
    }
}
