pub mod cli;
pub mod config;
pub mod consumer;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod sse;

use cli::Args;
use config::prompt::load_prompts_or_default;
use llm::chat::{ new_client as new_chat_client, ChatOptions };
use llm::{ LlmConfig, LlmType };
use log::{ info, warn };
use relay::Relay;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let llm_type: LlmType = args.chat_llm_type.parse()?;
    let api_key = LlmConfig::resolve_api_key(llm_type, &args.chat_api_key);

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("Temperature: {}", args.temperature);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Max Body Bytes: {}", args.max_body_bytes);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    if api_key.is_none() {
        if let Some(env_name) = llm_type.api_key_env() {
            warn!(
                "No API key configured (CHAT_API_KEY or {}). Requests will fail until one is provided.",
                env_name
            );
        }
    }

    let chat_config = LlmConfig {
        llm_type,
        api_key,
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
    };
    let chat_client = new_chat_client(&chat_config)?;
    info!(
        "Chat client configured: Type={}, Model={}, BaseURL={:?}",
        llm_type,
        chat_client.get_model(),
        chat_client.get_base_url()
    );

    let prompts = load_prompts_or_default(args.prompts_path.as_deref())?;
    let relay = Arc::new(
        Relay::new(chat_client, prompts, ChatOptions { temperature: args.temperature })
    );

    let server = Server::new(args.server_addr.clone(), relay, args.clone());
    server.run().await?;

    Ok(())
}
