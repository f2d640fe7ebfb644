//! Channel invoker: one delivery attempt against a configured channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::invoker::{classify_status, HttpExecutor, InvokeError};
use crate::model::{Channel, Message, RequestTemplate};
use crate::render::{render, MessageFields};

/// Suffix glue between truncated content and the view link.
const TRUNCATION_MARK: &str = "… ";

/// A successful delivery.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    pub sent_at: DateTime<Utc>,
}

/// Executes rendered channel requests.
pub struct ChannelInvoker {
    executor: Arc<HttpExecutor>,
    timeout: Duration,
}

impl ChannelInvoker {
    pub fn new(executor: Arc<HttpExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    /// Perform one delivery attempt. No persisted state is touched here;
    /// the caller records the classified outcome.
    pub async fn invoke(
        &self,
        channel: &Channel,
        message: &Message,
        view_url: &str,
    ) -> Result<ChannelDelivery, InvokeError> {
        let fields = apply_length_cap(
            &channel.template,
            MessageFields::from_message(message, view_url),
            channel.max_length,
            view_url,
        );

        let request = render(&channel.template, &fields)
            .map_err(|e| InvokeError::Fatal(format!("render failed: {}", e)))?;

        tracing::debug!(
            channel_id = %channel.id,
            message_id = %message.id,
            method = %request.method,
            "Invoking channel"
        );

        let (status, body) = self
            .executor
            .execute(&request, channel.template.proxy.as_deref(), self.timeout)
            .await?;
        classify_status(status, &body)?;

        Ok(ChannelDelivery { sent_at: Utc::now() })
    }
}

/// Spend a channel's payload cap across every message field its template
/// interpolates. Title and url are delivered verbatim and charged first;
/// content claims the remaining budget, truncated behind the view link;
/// fetched page text gets whatever is left. The interpolated message
/// text therefore never totals more than `max_length` characters, no
/// matter how many fields the template composes.
fn apply_length_cap(
    template: &RequestTemplate,
    mut fields: MessageFields,
    max_length: usize,
    view_url: &str,
) -> MessageFields {
    let mut budget = max_length;
    for (slot, value) in [("title", &fields.title), ("url", &fields.url)] {
        budget = budget.saturating_sub(slot_refs(template, slot) * value.chars().count());
    }

    let content_refs = slot_refs(template, "content");
    if content_refs > 0 {
        let capped = truncate_with_view_link(&fields.content, budget / content_refs, view_url);
        budget = budget.saturating_sub(content_refs * capped.chars().count());
        fields.content = capped;
    }

    let url_content_refs = slot_refs(template, "url_content");
    if url_content_refs > 0 {
        fields.url_content =
            truncate_with_view_link(&fields.url_content, budget / url_content_refs, view_url);
    }

    fields
}

/// How many times a template interpolates a message field. A
/// template-declared placeholder of the same name shadows the field, so
/// it costs nothing against the cap.
fn slot_refs(template: &RequestTemplate, slot: &str) -> usize {
    if template.placeholders.contains_key(slot) {
        return 0;
    }
    let needle = format!("{{{}}}", slot);
    let count = |s: &str| s.matches(needle.as_str()).count();
    count(&template.api_url)
        + template.params.values().map(|v| count(v)).sum::<usize>()
        + template.headers.values().map(|v| count(v)).sum::<usize>()
}

/// Enforce a channel's payload cap: content longer than `max_length`
/// chars is cut to leave room for `"… " + view_url`, so the final string
/// never exceeds `max_length` and ends with the view link.
pub fn truncate_with_view_link(content: &str, max_length: usize, view_url: &str) -> String {
    if content.chars().count() <= max_length {
        return content.to_string();
    }
    let suffix = format!("{}{}", TRUNCATION_MARK, view_url);
    let suffix_len = suffix.chars().count();
    let keep = max_length.saturating_sub(suffix_len);
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(&suffix);
    // Degenerate config where the suffix alone exceeds the cap: keep the
    // tail so the link stays reachable.
    if out.chars().count() > max_length {
        let drop = out.chars().count() - max_length;
        out = out.chars().skip(drop).collect();
    }
    out
}
