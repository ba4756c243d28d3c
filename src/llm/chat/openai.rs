use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, ChatClient, ChatOptions, ChatStream, LlmError };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use log::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorChunk {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Parses one line of an OpenAI-compatible `chat/completions` SSE body.
/// Shared by every provider speaking that dialect.
pub(crate) fn parse_chat_completion_line(line: &str) -> Result<Option<String>, LlmError> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };
    if data == "[DONE]" {
        return Ok(None);
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            let text = chunk.choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .filter(|content| !content.is_empty());
            Ok(text)
        }
        Err(e) => {
            if let Ok(err) = serde_json::from_str::<ErrorChunk>(data) {
                return Err(LlmError::Provider(err.error.message));
            }
            debug!("JSON parse error: {} for data: {}", e, data);
            Ok(None)
        }
    }
}

pub(crate) fn build_http_client(api_key: Option<&str>) -> Result<HttpClient, LlmError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e|
            LlmError::Config(format!("Invalid API key format: {}", e))
        )?;
        value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }

    HttpClient::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| LlmError::Config(e.to_string()))
}

pub struct OpenAIChatClient {
    http: HttpClient,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, LlmError> {
        let http = build_http_client(api_key.as_deref())?;
        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(config.api_key.clone(), config.completion_model.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions
    ) -> Result<ChatStream, LlmError> {
        if self.api_key.is_none() {
            return Err(LlmError::MissingApiKey(LlmType::OpenAI));
        }
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let req = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            stream: true,
        };
        http_stream_generate(&self.http, url, req, parse_chat_completion_line, None).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_delta_content() {
        let line = r#"data: {"id":"1","choices":[{"index":0,"delta":{"content":"Bon"}}]}"#;
        assert_eq!(parse_chat_completion_line(line).unwrap(), Some("Bon".to_string()));
    }

    #[test]
    fn skips_units_without_text() {
        for line in [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":""},"finish_reason":"stop"}]}"#,
            r#"data: {"choices":[]}"#,
            "data: [DONE]",
            ": keep-alive",
            "data: {broken",
        ] {
            assert_eq!(parse_chat_completion_line(line).unwrap(), None, "{}", line);
        }
    }

    #[test]
    fn surfaces_in_stream_errors() {
        let line = r#"data: {"error":{"message":"Rate limit reached","type":"requests"}}"#;
        let err = parse_chat_completion_line(line).unwrap_err();
        assert!(err.to_string().contains("Rate limit reached"));
    }
}
