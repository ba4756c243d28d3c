#![allow(dead_code)]

use async_trait::async_trait;
use doc_chat_relay::config::prompt::PromptConfig;
use doc_chat_relay::llm::chat::{ ChatClient, ChatOptions, ChatStream, LlmError };
use doc_chat_relay::models::chat::ChatMessage;
use doc_chat_relay::relay::Relay;
use doc_chat_relay::server::api::{ router, CHAT_ROUTE };
use futures::stream;
use std::sync::{ Arc, Mutex };

/// Provider double that replays a fixed script and records what it was sent.
pub struct FakeProvider {
    deltas: Vec<String>,
    open_error: Option<fn() -> LlmError>,
    stream_error: Option<String>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeProvider {
    pub fn replying(deltas: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            open_error: None,
            stream_error: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_open(make: fn() -> LlmError) -> Arc<Self> {
        Arc::new(Self {
            deltas: Vec::new(),
            open_error: Some(make),
            stream_error: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_after(deltas: &[&str], reason: &str) -> Arc<Self> {
        Arc::new(Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            open_error: None,
            stream_error: Some(reason.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests().pop().expect("provider was never called")
    }
}

#[async_trait]
impl ChatClient for FakeProvider {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions
    ) -> Result<ChatStream, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        if let Some(make) = self.open_error {
            return Err(make());
        }
        let mut items: Vec<Result<String, LlmError>> = self.deltas
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        if let Some(reason) = &self.stream_error {
            items.push(Err(LlmError::Provider(reason.clone())));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    fn get_model(&self) -> String {
        "fake-model".into()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

pub fn relay_for(provider: Arc<FakeProvider>) -> Arc<Relay> {
    Arc::new(Relay::new(provider, Arc::new(PromptConfig::default()), ChatOptions::default()))
}

/// Serves the real router on an ephemeral port and returns the chat URL.
pub async fn spawn_relay(provider: Arc<FakeProvider>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(relay_for(provider), 1024 * 1024);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}{}", addr, CHAT_ROUTE)
}

pub fn messages() -> doc_chat_relay::config::prompt::ErrorMessages {
    PromptConfig::default().error_messages
}
