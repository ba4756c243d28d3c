use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::openai::{ build_http_client, parse_chat_completion_line, ChatCompletionRequest };
use super::{ http_stream_generate, ChatClient, ChatOptions, ChatStream, LlmError };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;

const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";
const DEFAULT_MODEL: &str = "mistral-small-latest";

/// Mistral's chat API speaks the OpenAI `chat/completions` streaming dialect.
pub struct MistralChatClient {
    http: HttpClient,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl MistralChatClient {
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

    /// The key is not required here: a missing key is reported on first use.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Mistral {
            return Err(LlmError::Config("Invalid config type for MistralChatClient".into()));
        }
        Self::new(config.api_key.clone(), config.completion_model.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl ChatClient for MistralChatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions
    ) -> Result<ChatStream, LlmError> {
        if self.api_key.is_none() {
            return Err(LlmError::MissingApiKey(LlmType::Mistral));
        }
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let req = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            stream: true,
        };
        http_stream_generate(
            &self.http,
            url,
            req,
            parse_chat_completion_line,
            Some(vec![("Accept".to_string(), "text/event-stream".to_string())])
        ).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
