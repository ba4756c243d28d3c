use clap::Parser;

const DEFAULT_MAX_BODY_BYTES: &str = "10485760";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Relays chat conversations to an LLM provider as Server-Sent Events", long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (mistral, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "mistral")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://api.mistral.ai/v1)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Falls back to MISTRAL_API_KEY / OPENAI_API_KEY.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., mistral-small-latest, gpt-4o-mini, llama3.1)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Sampling temperature sent with every request (0.0 to 1.5).
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7", value_parser = parse_temperature)]
    pub temperature: f32,

    // --- General App Args ---
    /// Path to a JSON prompt configuration (persona, document template, error messages).
    /// Built-in French prompts are used when unset.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Largest accepted request body in bytes (extracted documents can be large).
    #[arg(long, env = "MAX_BODY_BYTES", default_value = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Terminal chat client for the document chat relay", long_about = None)]
pub struct ClientArgs {
    /// Relay endpoint receiving chat turns.
    #[arg(long, env = "CHAT_ENDPOINT", default_value = "http://127.0.0.1:3000/api/chat")]
    pub endpoint: String,

    /// Text already extracted from a document, sent along with every turn.
    #[arg(long, env = "DOCUMENT_PATH")]
    pub document: Option<String>,
}

pub fn parse_temperature(value: &str) -> Result<f32, String> {
    let temperature: f32 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{}' is not a number: {}", value, e))?;
    if !(0.0..=1.5).contains(&temperature) {
        return Err(format!("temperature must be between 0.0 and 1.5, got {}", temperature));
    }
    Ok(temperature)
}
