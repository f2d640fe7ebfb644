//! AI invoker: runs a message through a configured AI channel and
//! extracts the completion text from the provider response.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::invoker::{classify_status, clip, HttpExecutor, InvokeError, ERROR_SNIPPET_LEN};
use crate::model::{AiChannel, Message, PromptFamily};
use crate::render::{render, substitute, MessageFields};

/// Fallback prompt templates, one per prompt family. Individual AI
/// channels may carry their own prompt which takes precedence.
#[derive(Debug, Clone)]
pub struct DefaultPrompts {
    pub completion: String,
    pub local_model: String,
}

impl DefaultPrompts {
    fn for_family(&self, family: PromptFamily) -> &str {
        match family {
            PromptFamily::Completion => &self.completion,
            PromptFamily::LocalModel => &self.local_model,
        }
    }
}

impl Default for DefaultPrompts {
    fn default() -> Self {
        Self {
            completion: "Summarize the following message.\n\nTitle: {title}\nContent: {content}\n{url_content}".to_string(),
            local_model: "Summarize: {title} {content} {url_content}".to_string(),
        }
    }
}

/// A successful AI run.
#[derive(Debug, Clone)]
pub struct AiCompletion {
    pub result: String,
    pub prompt_used: String,
    pub processed_at: DateTime<Utc>,
}

/// Executes rendered AI requests.
pub struct AiInvoker {
    executor: Arc<HttpExecutor>,
    timeout: Duration,
    defaults: DefaultPrompts,
}

impl AiInvoker {
    pub fn new(executor: Arc<HttpExecutor>, timeout: Duration, defaults: DefaultPrompts) -> Self {
        Self {
            executor,
            timeout,
            defaults,
        }
    }

    /// Perform one AI attempt. The resolved prompt is returned alongside
    /// the result so both can be recorded.
    pub async fn invoke(
        &self,
        ai: &AiChannel,
        message: &Message,
        view_url: &str,
    ) -> Result<AiCompletion, InvokeError> {
        let fields = MessageFields::from_message(message, view_url);

        let prompt_template = ai
            .prompt
            .as_deref()
            .unwrap_or_else(|| self.defaults.for_family(ai.family));
        let prompt = substitute(prompt_template, &BTreeMap::new(), &fields);

        let fields = fields
            .with_extra("prompt", prompt.clone())
            .with_extra("model", ai.model.clone());

        let request = render(&ai.template, &fields)
            .map_err(|e| InvokeError::Fatal(format!("render failed: {}", e)))?;

        tracing::debug!(
            ai_channel_id = %ai.id,
            message_id = %message.id,
            model = %ai.model,
            "Invoking AI channel"
        );

        let (status, body) = self
            .executor
            .execute(&request, ai.template.proxy.as_deref(), self.timeout)
            .await?;
        classify_status(status, &body)?;

        Ok(AiCompletion {
            result: extract_result(&body),
            prompt_used: prompt,
            processed_at: Utc::now(),
        })
    }
}

/// Pull the completion text out of a provider response. Tries the
/// OpenAI chat shape, then the legacy completion shape, then a bare
/// `response` field; an unrecognized body is kept verbatim, clipped.
fn extract_result(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for path in [
            &["choices", "0", "message", "content"][..],
            &["choices", "0", "text"][..],
            &["response"][..],
        ] {
            if let Some(text) = walk(&value, path).and_then(serde_json::Value::as_str) {
                return text.to_string();
            }
        }
    }
    clip(body, ERROR_SNIPPET_LEN)
}

fn walk<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for step in path {
        current = match step.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(step)?,
        };
    }
    Some(current)
}
