//! HTTP chat provider: OpenAI-style SSE and Ollama NDJSON streaming.

use crate::error::{ChatError, Result};
use crate::provider::{ChatProvider, ChatRequest, CompletionStream};
use alcove_embed::ProviderKind;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ChatHttpConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl ChatHttpConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: kind.default_base_url().to_string(),
            api_key: None,
            model: model.into(),
            timeout: Duration::from_secs(120),
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

    fn chat_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.kind.is_openai_style() {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/api/chat")
        }
    }

    fn models_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.kind.is_openai_style() {
            format!("{base}/models")
        } else {
            format!("{base}/api/tags")
        }
    }
}

pub struct HttpChatProvider {
    config: ChatHttpConfig,
    client: reqwest::Client,
}

impl HttpChatProvider {
    pub fn new(config: ChatHttpConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(ChatError::invalid_config("chat model is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ChatError::from_transport)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ChatHttpConfig {
        &self.config
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        if self.config.kind.is_openai_style() {
            let mut body = json!({
                "model": &self.config.model,
                "messages": &request.messages,
                "stream": true,
            });
            if let Some(t) = request.temperature {
                body["temperature"] = json!(t);
            }
            if let Some(n) = request.max_tokens {
                body["max_tokens"] = json!(n);
            }
            body
        } else {
            let mut options = serde_json::Map::new();
            if let Some(t) = request.temperature {
                options.insert("temperature".into(), json!(t));
            }
            if let Some(n) = request.max_tokens {
                options.insert("num_predict".into(), json!(n));
            }
            json!({
                "model": &self.config.model,
                "messages": &request.messages,
                "stream": true,
                "options": options,
            })
        }
    }
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    async fn stream_complete(&self, request: ChatRequest) -> Result<CompletionStream> {
        let body = self.request_body(&request);
        let mut http = self.client.post(self.config.chat_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(ChatError::from_transport)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        debug!(kind = %self.config.kind, "completion stream opened");

        let kind = self.config.kind;
        let deltas = response
            .bytes_stream()
            .map_err(ChatError::from_transport)
            .scan(String::new(), move |buffer, chunk| {
                let items: Vec<Result<String>> = match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        let mut out = Vec::new();
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            match parse_stream_line(kind, line.trim()) {
                                Ok(Some(delta)) => out.push(Ok(delta)),
                                Ok(None) => {}
                                Err(e) => out.push(Err(e)),
                            }
                        }
                        out
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(deltas))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let mut http = self.client.get(self.config.models_url());
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }
        let response = http.send().await.map_err(ChatError::from_transport)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.text().await.map_err(ChatError::from_transport)?;
        if self.config.kind.is_openai_style() {
            parse_openai_models(&body)
        } else {
            parse_ollama_models(&body)
        }
    }
}

/// Extract the text delta from one line of a streaming response.
/// `Ok(None)` means the line carries no text (keep-alive, terminator, or a
/// delta-free frame).
pub fn parse_stream_line(kind: ProviderKind, line: &str) -> Result<Option<String>> {
    if kind.is_openai_style() {
        parse_sse_line(line)
    } else {
        parse_ndjson_line(line)
    }
}

#[derive(Deserialize)]
struct SseFrame {
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    delta: SseDelta,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_sse_line(line: &str) -> Result<Option<String>> {
    if line.is_empty() {
        return Ok(None);
    }
    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
        // comment or unknown field per the SSE grammar
        return Ok(None);
    };
    if payload == "[DONE]" {
        return Ok(None);
    }
    let frame: SseFrame = serde_json::from_str(payload)
        .map_err(|e| ChatError::malformed(format!("bad SSE frame: {e}")))?;
    Ok(frame
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty()))
}

#[derive(Deserialize)]
struct NdjsonFrame {
    #[serde(default)]
    message: Option<NdjsonMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct NdjsonMessage {
    #[serde(default)]
    content: String,
}

fn parse_ndjson_line(line: &str) -> Result<Option<String>> {
    if line.is_empty() {
        return Ok(None);
    }
    let frame: NdjsonFrame = serde_json::from_str(line)
        .map_err(|e| ChatError::malformed(format!("bad NDJSON frame: {e}")))?;
    if frame.done {
        return Ok(None);
    }
    Ok(frame
        .message
        .map(|m| m.content)
        .filter(|c| !c.is_empty()))
}

#[derive(Deserialize)]
struct OpenAiModelsResponse {
    data: Vec<OpenAiModel>,
}

#[derive(Deserialize)]
struct OpenAiModel {
    id: String,
}

fn parse_openai_models(body: &str) -> Result<Vec<String>> {
    let response: OpenAiModelsResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::malformed(format!("bad models payload: {e}")))?;
    Ok(response.data.into_iter().map(|m| m.id).collect())
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

fn parse_ollama_models(body: &str) -> Result<Vec<String>> {
    let response: OllamaTagsResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::malformed(format!("bad tags payload: {e}")))?;
    Ok(response.models.into_iter().map(|m| m.name).collect())
}
