//! Client side of the relay: one streamed HTTP request per user turn.
//!
//! The session owns the conversation. While a reply streams, its text lives
//! in an accumulator owned by the turn; observers only ever receive cloned
//! [`Transcript`] snapshots through a `watch` channel.

use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, StatusCode };
use thiserror::Error;
use tokio::sync::watch;

use crate::models::chat::{ ChatMessage, ChatRequestBody };
use crate::models::stream::StreamEvent;
use crate::sse::EventDecoder;

pub const DEFAULT_FAILURE_MESSAGE: &str =
    "Je m'excuse, mais j'ai rencontré une erreur. Veuillez réessayer.";

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("relay answered with status {0}")]
    Status(StatusCode),
    #[error("response body interrupted: {0}")]
    Body(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed,
    /// Blank input, nothing was sent.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    pub messages: Vec<ChatMessage>,
    pub state: TurnState,
}

impl Transcript {
    pub fn is_loading(&self) -> bool {
        matches!(self.state, TurnState::Sending | TurnState::Streaming)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// How the body of a successful response ended.
enum StreamEnd {
    Done,
    Error(String),
    Eof,
}

pub struct ChatSession {
    http: HttpClient,
    endpoint: String,
    conversation: Vec<ChatMessage>,
    failure_message: String,
    state: TurnState,
    publisher: watch::Sender<Transcript>,
}

impl ChatSession {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_http_client(HttpClient::new(), endpoint)
    }

    pub fn with_http_client(http: HttpClient, endpoint: impl Into<String>) -> Self {
        let (publisher, _) = watch::channel(Transcript::default());
        Self {
            http,
            endpoint: endpoint.into(),
            conversation: Vec::new(),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
            state: TurnState::Idle,
            publisher,
        }
    }

    /// Message shown when the transport fails.
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.publisher.subscribe()
    }

    pub fn transcript(&self) -> Transcript {
        self.publisher.borrow().clone()
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn reset(&mut self) {
        self.conversation.clear();
        self.state = TurnState::Idle;
        self.publish(None);
    }

    /// Sends `input` as a new user turn and streams the reply into the
    /// transcript. Taking `&mut self` keeps a single turn in flight.
    ///
    /// An in-band error after some fragments is appended to them with a
    /// `"\n\n"` separator, so the final reply is not the plain concatenation
    /// of the received frames. A transport failure replaces the reply with
    /// the failure message.
    pub async fn submit_turn(&mut self, input: &str, document_text: Option<&str>) -> TurnOutcome {
        if input.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        self.conversation.push(ChatMessage::user(input));
        self.transition(TurnState::Sending, None);

        let mut pending: Option<String> = None;
        let result = self.stream_reply(document_text, &mut pending).await;

        let (reply, outcome) = match result {
            Ok(StreamEnd::Done) => (pending.unwrap_or_default(), TurnOutcome::Completed),
            Ok(StreamEnd::Eof) => {
                warn!("Relay closed the stream without a terminal event");
                (pending.unwrap_or_default(), TurnOutcome::Completed)
            }
            Ok(StreamEnd::Error(message)) => {
                let mut text = pending.unwrap_or_default();
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&message);
                (text, TurnOutcome::Failed)
            }
            Err(e) => {
                warn!("Chat turn failed: {}", e);
                (self.failure_message.clone(), TurnOutcome::Failed)
            }
        };

        self.conversation.push(ChatMessage::assistant(reply));
        let terminal = match outcome {
            TurnOutcome::Completed => TurnState::Completed,
            _ => TurnState::Failed,
        };
        self.transition(terminal, None);
        self.transition(TurnState::Idle, None);
        info!("Chat turn finished: {:?} ({} messages)", outcome, self.conversation.len());
        outcome
    }

    async fn stream_reply(
        &mut self,
        document_text: Option<&str>,
        pending: &mut Option<String>
    ) -> Result<StreamEnd, ConsumerError> {
        let body = ChatRequestBody {
            messages: &self.conversation,
            file_content: document_text.filter(|text| !text.is_empty()),
        };

        let resp = self.http
            .post(&self.endpoint)
            .json(&body)
            .send().await
            .map_err(|source| ConsumerError::Request { url: self.endpoint.clone(), source })?;

        if !resp.status().is_success() {
            return Err(ConsumerError::Status(resp.status()));
        }

        let mut bytes = resp.bytes_stream();
        let mut decoder = EventDecoder::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(ConsumerError::Body)?;
            if chunk.is_empty() {
                continue;
            }
            if pending.is_none() {
                *pending = Some(String::new());
                self.transition(TurnState::Streaming, pending.as_deref());
            }
            for event in decoder.push(&chunk) {
                if let Some(end) = self.apply(event, pending) {
                    return Ok(end);
                }
            }
        }

        for event in decoder.finish() {
            if let Some(end) = self.apply(event, pending) {
                return Ok(end);
            }
        }

        if decoder.skipped() > 0 {
            debug!("Skipped {} undecodable line(s) in the response", decoder.skipped());
        }
        Ok(StreamEnd::Eof)
    }

    fn apply(&self, event: StreamEvent, pending: &mut Option<String>) -> Option<StreamEnd> {
        match event {
            StreamEvent::Fragment { text } => {
                if text.is_empty() {
                    return None;
                }
                let accumulated = pending.get_or_insert_with(String::new);
                accumulated.push_str(&text);
                self.publish(Some(accumulated.as_str()));
                None
            }
            StreamEvent::Done => Some(StreamEnd::Done),
            StreamEvent::Error { message } => Some(StreamEnd::Error(message)),
        }
    }

    fn transition(&mut self, state: TurnState, pending: Option<&str>) {
        debug!("Turn state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.publish(pending);
    }

    fn publish(&self, pending: Option<&str>) {
        let mut messages = self.conversation.clone();
        if let Some(text) = pending {
            messages.push(ChatMessage::assistant(text));
        }
        self.publisher.send_replace(Transcript { messages, state: self.state });
    }
}
