use crate::config::prompt::PromptConfig;
use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    RateLimit,
    Generic,
}

/// Maps upstream failures to user-facing sentences by looking for known
/// substrings in the whole error chain.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    configuration_patterns: Vec<String>,
    rate_limit_patterns: Vec<String>,
    configuration_message: String,
    rate_limit_message: String,
    generic_message: String,
}

impl ErrorClassifier {
    pub fn from_prompts(config: &PromptConfig) -> Self {
        let lower = |patterns: &[String]| -> Vec<String> {
            patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            configuration_patterns: lower(&config.error_patterns.configuration),
            rate_limit_patterns: lower(&config.error_patterns.rate_limit),
            configuration_message: config.error_messages.configuration.clone(),
            rate_limit_message: config.error_messages.rate_limit.clone(),
            generic_message: config.error_messages.generic.clone(),
        }
    }

    pub fn classify_text(&self, text: &str) -> ErrorKind {
        let text = text.to_lowercase();
        if self.configuration_patterns.iter().any(|p| text.contains(p.as_str())) {
            ErrorKind::Configuration
        } else if self.rate_limit_patterns.iter().any(|p| text.contains(p.as_str())) {
            ErrorKind::RateLimit
        } else {
            ErrorKind::Generic
        }
    }

    pub fn classify(&self, error: &(dyn Error + 'static)) -> ErrorKind {
        self.classify_text(&error_chain_text(error))
    }

    pub fn message_for(&self, kind: ErrorKind) -> &str {
        match kind {
            ErrorKind::Configuration => &self.configuration_message,
            ErrorKind::RateLimit => &self.rate_limit_message,
            ErrorKind::Generic => &self.generic_message,
        }
    }

    pub fn generic_message(&self) -> &str {
        &self.generic_message
    }
}

fn error_chain_text(error: &(dyn Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
