//! The conversation orchestrator: retrieve, assemble, stream, remember.
//!
//! Each question moves through a fixed sequence of phases:
//!
//! ```text
//! Idle → Retrieving → AssemblingPrompt → Streaming → Complete
//!                                            │
//!                                            ├→ Cancelled (partial kept)
//!                                            └→ Failed    (no answer turn)
//! ```
//!
//! The answer streams through a channel so the caller renders deltas as
//! they arrive; once the provider finishes, the accumulated text becomes an
//! assistant turn in history. Cancellation is cooperative: the token is
//! checked between deltas, the partial answer is kept flagged truncated,
//! and the provider connection is dropped.

use crate::error::{ChatError, Result as ChatResult};
use crate::history::{ConversationHistory, ConversationTurn};
use crate::provider::{ChatMessage, ChatProvider, ChatRequest, Role};
use alcove_retriever::retrieval::planner::{RetrievalPlanner, ScoredChunk};
use alcove_retriever::storage::StoreStats;
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Grounding instructions sent as the system message on every query.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about \
the user's personal documents. Base your answers on the provided context. When the context does \
not contain the answer, say so plainly instead of guessing. Cite the source file when it helps.";

const EMPTY_CONTEXT_NOTE: &str = "No relevant context was found in the indexed documents for \
this question.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    /// Upper bound on total prompt characters; history is trimmed first,
    /// then the lowest-scoring context chunks.
    pub prompt_char_budget: usize,
    /// How many recent turns are offered to the prompt before trimming.
    pub history_turns: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt_char_budget: 12_000,
            history_turns: 6,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Where a query currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    Idle,
    Retrieving,
    AssemblingPrompt,
    Streaming,
    Complete,
    Cancelled,
    Failed,
}

/// Cooperative cancellation flag shared between the caller and the
/// streaming task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ChatOrchestrator {
    planner: RetrievalPlanner,
    provider: Arc<dyn ChatProvider>,
    config: OrchestratorConfig,
    history: Arc<Mutex<ConversationHistory>>,
    phase: Arc<std::sync::Mutex<QueryPhase>>,
}

impl ChatOrchestrator {
    pub fn new(
        planner: RetrievalPlanner,
        provider: Arc<dyn ChatProvider>,
        config: OrchestratorConfig,
        history: ConversationHistory,
    ) -> Self {
        Self {
            planner,
            provider,
            config,
            history: Arc::new(Mutex::new(history)),
            phase: Arc::new(std::sync::Mutex::new(QueryPhase::Idle)),
        }
    }

    pub fn phase(&self) -> QueryPhase {
        match self.phase.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_phase(&self, phase: QueryPhase) {
        set_phase(&self.phase, phase);
    }

    /// Answer `question`, streaming text deltas as they arrive.
    ///
    /// The user turn is recorded before generation starts; the assistant
    /// turn is recorded when the stream completes (or is cancelled, flagged
    /// truncated). A failed generation records no assistant turn and is
    /// never retried automatically.
    pub async fn ask(
        &self,
        question: &str,
        cancel: CancelToken,
    ) -> Result<ReceiverStream<ChatResult<String>>> {
        self.set_phase(QueryPhase::Retrieving);
        let chunks = match self.planner.retrieve(question).await {
            Ok(chunks) => chunks,
            Err(e) => {
                self.set_phase(QueryPhase::Failed);
                return Err(e);
            }
        };
        debug!(context_chunks = chunks.len(), "retrieval finished");

        self.set_phase(QueryPhase::AssemblingPrompt);
        let recent = {
            let history = self.history.lock().await;
            history.recent(self.config.history_turns)
        };
        let messages = assemble_messages(&self.config, &chunks, &recent, question);

        let mut request = ChatRequest::new(messages);
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;

        self.history
            .lock()
            .await
            .push(ConversationTurn::now(Role::User, question));

        let mut stream = match self.provider.stream_complete(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_phase(QueryPhase::Failed);
                return Err(e.into());
            }
        };
        self.set_phase(QueryPhase::Streaming);

        let (tx, rx) = mpsc::channel::<ChatResult<String>>(1);
        let history = self.history.clone();
        let phase = self.phase.clone();
        tokio::spawn(async move {
            let mut answer = String::new();
            let mut outcome = QueryPhase::Complete;
            while let Some(item) = stream.next().await {
                if cancel.is_cancelled() {
                    outcome = QueryPhase::Cancelled;
                    break;
                }
                match item {
                    Ok(delta) => {
                        answer.push_str(&delta);
                        if tx.send(Ok(delta)).await.is_err() {
                            // receiver gone, same as cancellation
                            outcome = QueryPhase::Cancelled;
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "generation failed mid-stream");
                        outcome = QueryPhase::Failed;
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
            // dropping the stream here closes the provider connection
            drop(stream);

            match outcome {
                QueryPhase::Complete => {
                    history
                        .lock()
                        .await
                        .push(ConversationTurn::now(Role::Assistant, answer));
                }
                QueryPhase::Cancelled => {
                    info!("generation cancelled, keeping partial answer");
                    history
                        .lock()
                        .await
                        .push(ConversationTurn::truncated(Role::Assistant, answer));
                }
                // a failed generation leaves no assistant turn
                _ => {}
            }
            set_phase(&phase, outcome);
        });

        Ok(ReceiverStream::new(rx))
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.history.lock().await.turns().cloned().collect()
    }

    pub async fn stats(&self) -> StoreStats {
        self.planner.store().stats().await
    }
}

fn set_phase(slot: &std::sync::Mutex<QueryPhase>, phase: QueryPhase) {
    match slot.lock() {
        Ok(mut guard) => *guard = phase,
        Err(poisoned) => *poisoned.into_inner() = phase,
    }
}

/// Build the message list for one query, trimming to the char budget:
/// oldest history turns go first, then the lowest-scoring chunks. The
/// system instructions and the question itself are never trimmed.
fn assemble_messages(
    config: &OrchestratorConfig,
    chunks: &[ScoredChunk],
    history: &[ConversationTurn],
    question: &str,
) -> Vec<ChatMessage> {
    let mut kept_chunks: Vec<&ScoredChunk> = chunks.iter().collect();
    let mut kept_history: Vec<&ConversationTurn> = history.iter().collect();

    loop {
        let messages = build_messages(config, &kept_chunks, &kept_history, question);
        let total: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        if total <= config.prompt_char_budget {
            return messages;
        }
        if !kept_history.is_empty() {
            kept_history.remove(0);
        } else if !kept_chunks.is_empty() {
            // chunks arrive score-descending, so the last is the weakest
            kept_chunks.pop();
        } else {
            return messages;
        }
    }
}

fn build_messages(
    config: &OrchestratorConfig,
    chunks: &[&ScoredChunk],
    history: &[&ConversationTurn],
    question: &str,
) -> Vec<ChatMessage> {
    let context = if chunks.is_empty() {
        EMPTY_CONTEXT_NOTE.to_string()
    } else {
        chunks
            .iter()
            .map(|c| format!("Source: {}\n{}", c.path, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{}\n\nContext:\n{context}",
        config.system_prompt
    )));
    for turn in history {
        messages.push(ChatMessage {
            role: turn.role,
            content: turn.text.clone(),
        });
    }
    messages.push(ChatMessage::user(question));
    messages
}
