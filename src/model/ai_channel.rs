//! AI enrichment channel model.
//!
//! An AI channel points at a language-model HTTP endpoint (local or cloud)
//! and carries an optional prompt template. When the prompt is unset, the
//! invoker falls back to the process-wide default for the channel's family.

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::model::channel::RequestTemplate;

/// Which default prompt a channel falls back to when it has none of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFamily {
    /// Cloud completion-style endpoints (OpenAI-compatible chat APIs).
    Completion,
    /// Local model endpoints (Ollama-style).
    LocalModel,
}

impl Default for PromptFamily {
    fn default() -> Self {
        PromptFamily::Completion
    }
}

/// A configured AI enrichment target. Read-only to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiChannel {
    pub id: String,
    pub name: String,
    /// Model identifier, exposed to templates as `{model}`.
    pub model: String,
    pub template: RequestTemplate,
    /// Prompt template; message fields are interpolated into it.
    /// `None` falls back to the family default.
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub family: PromptFamily,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AiChannel {
    /// Validate the channel configuration at load time.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.id.trim().is_empty() {
            return Err(TemplateError::InvalidField {
                field: "id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(TemplateError::InvalidField {
                field: "model".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        self.template.validate()
    }
}
