pub mod mistral;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use reqwest::{ Client as HttpClient, StatusCode };
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use log::debug;

use super::{ LlmConfig, LlmType };
use self::mistral::MistralChatClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;
use crate::sse::LineBuffer;

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key is not configured for {0}")]
    MissingApiKey(LlmType),
    #[error("invalid client configuration: {0}")]
    Config(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream returned {status}: {body}")]
    Status {
        status: StatusCode,
        body: String,
    },
    #[error("upstream stream interrupted: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("provider error: {0}")]
    Provider(String),
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Per-call sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self { temperature: 0.7 }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Opens a streaming completion. An `Err` means nothing was streamed;
    /// errors after that arrive as items of the returned stream. Items are
    /// text deltas in provider order; units without text are never yielded.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions
    ) -> Result<ChatStream, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

/// Turns one line of a provider body into an optional text delta.
pub type LineParser = fn(&str) -> Result<Option<String>, LlmError>;

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Mistral => {
            let specific_client = MistralChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// POSTs `payload` and, once the upstream accepted it, forwards parsed lines
/// of the body through a channel. Connection and status failures are
/// returned directly so callers can tell them apart from mid-stream ones.
pub async fn http_stream_generate(
    http: &HttpClient,
    url: String,
    payload: impl Serialize,
    line_parser: LineParser,
    headers: Option<Vec<(String, String)>>
) -> Result<ChatStream, LlmError> {
    let mut req = http.post(&url).json(&payload);

    if let Some(header_list) = headers {
        for (name, value) in header_list {
            req = req.header(name, value);
        }
    }

    let resp = req.send().await.map_err(|source| LlmError::Transport { url: url.clone(), source })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(LlmError::Status { status, body: truncate(body.trim(), MAX_ERROR_BODY) });
    }

    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut bytes = resp.bytes_stream();
        let mut lines = LineBuffer::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    for line in lines.push(&buf) {
                        if !forward_line(&tx, line_parser, &line).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(LlmError::Stream(e))).await;
                    return;
                }
            }
        }

        if let Some(line) = lines.finish() {
            forward_line(&tx, line_parser, &line).await;
        }
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

/// Returns `false` once the stream must stop: the receiver is gone or the
/// provider reported an error.
async fn forward_line(
    tx: &mpsc::Sender<Result<String, LlmError>>,
    line_parser: LineParser,
    line: &str
) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    match line_parser(line) {
        Ok(Some(token)) => tx.send(Ok(token)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            debug!("Provider reported an error in-stream: {}", e);
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
