use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use super::{ http_stream_generate, ChatClient, ChatOptions, ChatStream, LlmError };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use log::info;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

fn parse_ndjson_line(line: &str) -> Result<Option<String>, LlmError> {
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(StreamResponse { error: Some(message), .. }) => Err(LlmError::Provider(message)),
        Ok(stream_resp) =>
            Ok(
                stream_resp.message
                    .map(|m| m.content)
                    .filter(|content| !content.is_empty())
            ),
        Err(e) => {
            info!("JSON parse error: {} for line: {}", e, line);
            Ok(None)
        }
    }
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Self {
            http: HttpClient::new(),
            base_url: url,
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Ollama {
            return Err(LlmError::Config("Invalid config type for OllamaClient".into()));
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions
    ) -> Result<ChatStream, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = OllamaChatRequest {
            model: &self.completion_model,
            messages,
            stream: true,
            options: OllamaOptions { temperature: options.temperature },
        };
        http_stream_generate(&self.http, url, req, parse_ndjson_line, None).await
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
