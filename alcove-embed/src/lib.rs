//! alcove-embed: embedding capability for the Alcove indexing pipeline.
//!
//! Embeddings are served by the same local AI stack that answers chat
//! queries (LM Studio, Ollama, or any OpenAI-compatible server), so this
//! crate models embedding as an HTTP capability rather than an in-process
//! model: the [`EmbeddingProvider`] trait is the seam the indexing engine
//! depends on, and [`HttpEmbeddingProvider`] is the one concrete
//! implementation, parameterized by a closed [`ProviderKind`] set chosen
//! once at startup from configuration.

pub mod error;
pub mod http;
pub mod provider;

pub use error::{EmbedError, Result};
pub use http::{EmbedHttpConfig, HttpEmbeddingProvider};
pub use provider::{EmbeddingProvider, EmbeddingResult, ProviderKind};
