use serde::{ Deserialize, Serialize };

/// Payload of the terminal `data:` frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One event of a relay response stream. A stream carries any number of
/// fragments followed by exactly one `Done` or `Error`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment {
        text: String,
    },
    Done,
    Error {
        message: String,
    },
}

/// JSON carried in a `data:` frame. Error frames keep the `content` field so
/// clients that only read `content` still show the message.
#[derive(Serialize, Deserialize, Debug)]
struct WirePayload {
    content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    error: bool,
}

impl StreamEvent {
    pub fn fragment(text: impl Into<String>) -> Self {
        StreamEvent::Fragment { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error { message: message.into() }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment { .. })
    }

    /// Encodes the event as the value of an SSE `data:` field.
    pub fn to_data(&self) -> String {
        let payload = match self {
            StreamEvent::Done => {
                return DONE_SENTINEL.to_string();
            }
            StreamEvent::Fragment { text } => WirePayload { content: text.clone(), error: false },
            StreamEvent::Error { message } => WirePayload { content: message.clone(), error: true },
        };
        serde_json::to_string(&payload).unwrap_or_else(|_| String::from("{\"content\":\"\"}"))
    }

    /// Decodes the value of an SSE `data:` field. Returns `None` for anything
    /// that is neither the sentinel nor a `{"content": ...}` object.
    pub fn from_data(data: &str) -> Option<Self> {
        let data = data.trim();
        if data == DONE_SENTINEL {
            return Some(StreamEvent::Done);
        }
        let payload: WirePayload = serde_json::from_str(data).ok()?;
        if payload.error {
            Some(StreamEvent::Error { message: payload.content })
        } else {
            Some(StreamEvent::Fragment { text: payload.content })
        }
    }
}
