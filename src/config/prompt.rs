use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    PlaceholderMissing(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Prompt template '{}' is empty", key),
            PromptError::PlaceholderMissing(key) =>
                write!(f, "Prompt template is missing the '{}' placeholder", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

const DEFAULT_PERSONA: &str =
    "Vous êtes un assistant IA pour un cabinet de conseil spécialisé en audit, fiscalité et conseil.

Consignes pour chaque réponse :
- Soyez professionnel et informé sur les services du cabinet.
- Allez droit au but : répondez de façon courte, concise et directe, sans digression.
- Fournissez uniquement l'information essentielle, sans phrase inutile.
- Répondez toujours en français, de manière professionnelle et courtoise.";

const DEFAULT_DOCUMENT_TEMPLATE: &str =
    "L'utilisateur a téléchargé un document PDF. Voici le texte extrait pour analyse :

{document}

Veuillez analyser ce texte et fournir des insights liés aux domaines d'expertise du cabinet ({domain}).";

const DEFAULT_DOMAIN: &str = "audit, fiscalité, conseil, etc.";

/// Localized sentences sent to the user in place of upstream failures.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ErrorMessages {
    pub configuration: String,
    pub rate_limit: String,
    pub generic: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            configuration: "Erreur de configuration de la clé API. Veuillez vérifier votre clé API Mistral.".into(),
            rate_limit: "Limite de taux dépassée. Veuillez réessayer dans un moment.".into(),
            generic: "Je m'excuse, mais j'ai rencontré une erreur lors du traitement de votre demande. Veuillez réessayer.".into(),
        }
    }
}

/// Substrings looked up (case-insensitively) in upstream error text.
/// Provider wording changes between versions, so these live in config.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ErrorPatterns {
    pub configuration: Vec<String>,
    pub rate_limit: Vec<String>,
}

impl Default for ErrorPatterns {
    fn default() -> Self {
        Self {
            configuration: vec![
                "api key".into(),
                "invalid credential".into(),
                "unauthorized".into()
            ],
            rate_limit: vec!["rate limit".into(), "too many requests".into()],
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    pub persona: String,
    pub document_template: String,
    pub domain: String,
    pub error_messages: ErrorMessages,
    pub error_patterns: ErrorPatterns,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.into(),
            document_template: DEFAULT_DOCUMENT_TEMPLATE.into(),
            domain: DEFAULT_DOMAIN.into(),
            error_messages: ErrorMessages::default(),
            error_patterns: ErrorPatterns::default(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.persona.trim().is_empty() {
            return Err(PromptError::TemplateNotFound("persona".to_string()));
        }
        if !self.document_template.contains("{document}") {
            return Err(PromptError::PlaceholderMissing("{document}".to_string()));
        }
        Ok(())
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<PromptConfig, PromptError> {
    let config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config = load_prompts_from_str(&file_content)?;
    info!("Loaded prompt configuration from {}", path.as_ref().display());
    Ok(Arc::new(config))
}

/// Loads the prompts file when one is configured, otherwise the built-in defaults.
pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => {
            info!("No prompts file configured, using built-in prompts");
            Ok(Arc::new(PromptConfig::default()))
        }
    }
}

pub fn get_document_prompt(config: &PromptConfig, document: &str) -> String {
    config.document_template
        .replace("{domain}", &config.domain)
        .replace("{document}", document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PromptConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = load_prompts_from_str(
            r#"{ "domain": "audit", "error_messages": { "generic": "Oups" } }"#
        ).unwrap();
        assert_eq!(config.domain, "audit");
        assert_eq!(config.error_messages.generic, "Oups");
        assert_eq!(config.error_messages.rate_limit, ErrorMessages::default().rate_limit);
        assert_eq!(config.persona, DEFAULT_PERSONA);
    }

    #[test]
    fn template_without_document_placeholder_is_rejected() {
        let err = load_prompts_from_str(r#"{ "document_template": "Analysez." }"#).unwrap_err();
        assert!(matches!(err, PromptError::PlaceholderMissing(_)));
    }

    #[test]
    fn document_prompt_embeds_text_and_domain() {
        let prompt = get_document_prompt(&PromptConfig::default(), "Rapport financier 2024");
        assert!(prompt.contains("Rapport financier 2024"));
        assert!(prompt.contains(DEFAULT_DOMAIN));
        assert!(!prompt.contains("{document}"));
    }

    #[test]
    fn document_text_is_not_reinterpreted_as_template() {
        let prompt = get_document_prompt(&PromptConfig::default(), "literal {domain}");
        assert!(prompt.contains("literal {domain}"));
    }
}
