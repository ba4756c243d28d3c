use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Lenient role parsing: unknown or missing roles are treated as `User`.
    fn coerce(value: Option<&JsonValue>) -> Self {
        match value.and_then(|v| v.as_str()).map(|s| s.trim().to_lowercase()) {
            Some(role) if role == "system" => Role::System,
            Some(role) if role == "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn coerce(value: &JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => {
                let role = Role::coerce(map.get("role"));
                let content = match map.get("content") {
                    Some(JsonValue::String(s)) => s.clone(),
                    Some(JsonValue::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Self { role, content }
            }
            JsonValue::String(s) => Self::user(s.clone()),
            JsonValue::Null => Self::user(String::new()),
            other => Self::user(other.to_string()),
        }
    }
}

/// Body of `POST /api/chat`, as sent by the consumer.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequestBody<'a> {
    pub messages: &'a [ChatMessage],
    #[serde(rename = "fileContent")]
    pub file_content: Option<&'a str>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayRequest {
    pub conversation: Vec<ChatMessage>,
    pub document_text: Option<String>,
}

impl RelayRequest {
    pub fn new(conversation: Vec<ChatMessage>, document_text: Option<String>) -> Self {
        Self { conversation, document_text }
    }

    /// Builds a request out of an arbitrary JSON value. Malformed message
    /// entries are coerced instead of rejected; only a non-object body fails.
    pub fn from_value(value: &JsonValue) -> Result<Self, String> {
        let body = value
            .as_object()
            .ok_or_else(|| format!("request body must be a JSON object, got {}", kind_of(value)))?;

        let conversation = match body.get("messages") {
            Some(JsonValue::Array(entries)) => entries.iter().map(ChatMessage::coerce).collect(),
            _ => Vec::new(),
        };

        let document_text = match body.get("fileContent") {
            Some(JsonValue::String(s)) => Some(s.clone()),
            _ => None,
        };

        Ok(Self { conversation, document_text })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let value: JsonValue = serde_json
            ::from_slice(bytes)
            .map_err(|e| format!("Failed to parse chat request: {}", e))?;
        Self::from_value(&value)
    }

    /// Document text worth sending upstream: present and not blank.
    pub fn usable_document(&self) -> Option<&str> {
        self.document_text.as_deref().filter(|text| !text.trim().is_empty())
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
