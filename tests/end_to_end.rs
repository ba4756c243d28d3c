//! The consumer talking to the real router over loopback HTTP.

mod common;

use common::{ messages, spawn_relay, FakeProvider };
use doc_chat_relay::consumer::{ ChatSession, TurnOutcome };
use doc_chat_relay::llm::chat::LlmError;
use doc_chat_relay::llm::LlmType;
use doc_chat_relay::models::chat::{ ChatMessage, Role };

#[tokio::test]
async fn full_turn_reaches_the_provider_and_back() {
    let provider = FakeProvider::replying(&["Bon", "jour", " !"]);
    let url = spawn_relay(provider.clone()).await;

    let mut session = ChatSession::new(url);
    assert_eq!(session.submit_turn("Bonjour", None).await, TurnOutcome::Completed);
    assert_eq!(
        session.transcript().messages,
        vec![ChatMessage::user("Bonjour"), ChatMessage::assistant("Bonjour !")]
    );

    let sent = provider.last_request();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].role, Role::System);
    assert_eq!(sent[1], ChatMessage::user("Bonjour"));
}

#[tokio::test]
async fn document_reaches_the_provider_as_context() {
    let provider = FakeProvider::replying(&["42 M€"]);
    let url = spawn_relay(provider.clone()).await;

    let mut session = ChatSession::new(url);
    session.submit_turn("Quel est le chiffre d'affaires ?", Some("CA 2023 : 42 M€")).await;

    let sent = provider.last_request();
    assert_eq!(sent.len(), 3);
    assert!(sent[1].content.contains("CA 2023 : 42 M€"));
}

#[tokio::test]
async fn missing_credentials_show_the_configuration_message() {
    let provider = FakeProvider::failing_open(|| LlmError::MissingApiKey(LlmType::Mistral));
    let url = spawn_relay(provider).await;

    let mut session = ChatSession::new(url);
    assert_eq!(session.submit_turn("Bonjour", None).await, TurnOutcome::Failed);
    assert_eq!(
        session.transcript().last(),
        Some(&ChatMessage::assistant(messages().configuration))
    );
}

#[tokio::test]
async fn mid_stream_throttling_keeps_the_partial_reply() {
    let provider = FakeProvider::failing_after(&["Bonjour"], "rate limit exceeded");
    let url = spawn_relay(provider).await;

    let mut session = ChatSession::new(url);
    assert_eq!(session.submit_turn("Bonjour", None).await, TurnOutcome::Failed);

    let expected = format!("Bonjour\n\n{}", messages().rate_limit);
    assert_eq!(session.transcript().last(), Some(&ChatMessage::assistant(expected)));
}

#[tokio::test]
async fn concurrent_sessions_do_not_share_state() {
    let provider = FakeProvider::replying(&["Réponse"]);
    let url = spawn_relay(provider.clone()).await;

    let mut first = ChatSession::new(url.clone());
    let mut second = ChatSession::new(url);

    let (a, b) = tokio::join!(
        first.submit_turn("Question A", None),
        second.submit_turn("Question B", None)
    );
    assert_eq!(a, TurnOutcome::Completed);
    assert_eq!(b, TurnOutcome::Completed);

    assert_eq!(first.conversation()[0], ChatMessage::user("Question A"));
    assert_eq!(second.conversation()[0], ChatMessage::user("Question B"));
    assert_eq!(first.conversation().len(), 2);
    assert_eq!(second.conversation().len(), 2);
    assert_eq!(provider.requests().len(), 2);
}
