//! alcove-chat: retrieval-grounded conversation over a local language model.
//!
//! Sits on top of `alcove-retriever`: a question is embedded and matched
//! against the document index, the best chunks become a source-tagged
//! context block, and the answer streams back from a local chat provider
//! (LM Studio, Ollama, or any OpenAI-compatible server) while conversation
//! history accumulates across turns.

pub mod config;
pub mod error;
pub mod history;
pub mod http;
pub mod orchestrator;
pub mod provider;

pub use config::AlcoveConfig;
pub use error::{ChatError, Result};
pub use history::{ConversationHistory, ConversationTurn};
pub use http::{ChatHttpConfig, HttpChatProvider};
pub use orchestrator::{CancelToken, ChatOrchestrator, OrchestratorConfig, QueryPhase};
pub use provider::{ChatMessage, ChatProvider, ChatRequest, CompletionStream, Role};
