//! Template rendering.
//!
//! Turns a [`RequestTemplate`] plus message fields into a concrete HTTP
//! request. Pure: no IO, no clock, no shared state.
//!
//! Substitution resolves `{name}` slots in a single left-to-right pass.
//! Template-declared placeholders (secrets such as API keys) take
//! precedence over message fields, and substituted values are never
//! rescanned, so attacker-controlled message content that happens to
//! contain a placeholder token cannot pull a secret into the payload.
//! Slots that resolve to nothing render as the empty string; a literal
//! placeholder token never leaves the process.

use std::collections::BTreeMap;

use serde_json::json;

use crate::error::RenderError;
use crate::model::{ContentKind, HttpMethod, Message, RequestTemplate};

/// Message fields exposed to templates.
#[derive(Debug, Clone, Default)]
pub struct MessageFields {
    pub title: String,
    pub content: String,
    pub url: String,
    pub url_content: String,
    pub view_url: String,
    /// Extra slots, e.g. `{prompt}` and `{model}` for AI templates.
    pub extra: BTreeMap<String, String>,
}

impl MessageFields {
    pub fn from_message(message: &Message, view_url: &str) -> Self {
        Self {
            title: message.title.clone().unwrap_or_default(),
            content: message.content.clone().unwrap_or_default(),
            url: message.url.clone().unwrap_or_default(),
            url_content: message.url_content.clone().unwrap_or_default(),
            view_url: view_url.to_string(),
            extra: BTreeMap::new(),
        }
    }

    /// Override the content field, e.g. after truncation.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_extra(mut self, name: &str, value: impl Into<String>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "title" => Some(&self.title),
            "content" => Some(&self.content),
            "url" => Some(&self.url),
            "url_content" => Some(&self.url_content),
            "view_url" => Some(&self.view_url),
            other => self.extra.get(other).map(String::as_str),
        }
    }
}

/// A concrete HTTP request produced from a template.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub content_type: Option<ContentKind>,
}

/// Render a template into a concrete request.
pub fn render(
    template: &RequestTemplate,
    fields: &MessageFields,
) -> Result<RenderedRequest, RenderError> {
    let sub = |input: &str| substitute(input, &template.placeholders, fields);

    let mut url = sub(&template.api_url);

    let params: BTreeMap<String, String> = template
        .params
        .iter()
        .map(|(k, v)| (k.clone(), sub(v)))
        .collect();

    let headers: BTreeMap<String, String> = template
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), sub(v)))
        .collect();

    let body = match template.content_type {
        Some(ContentKind::Json) => {
            let object: serde_json::Map<String, serde_json::Value> = params
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            Some(
                serde_json::to_string(&serde_json::Value::Object(object))
                    .map_err(|e| RenderError::Serialization(e.to_string()))?,
            )
        }
        Some(ContentKind::Form) => Some(form_encode(&params)),
        Some(ContentKind::Xml) => Some(xml_encode(&params)),
        None => {
            // No body: params fold into the query string.
            if !params.is_empty() {
                let query = form_encode(&params);
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            }
            None
        }
    };

    url::Url::parse(&url).map_err(|e| RenderError::InvalidUrl(format!("{}: {}", url, e)))?;

    Ok(RenderedRequest {
        method: template.method,
        url,
        headers,
        body,
        content_type: template.content_type,
    })
}

/// Resolve `{name}` slots in one pass: placeholders first, then message
/// fields, then empty string. Inserted values are not rescanned.
pub fn substitute(
    input: &str,
    placeholders: &BTreeMap<String, String>,
    fields: &MessageFields,
) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(['{', '}']) {
            // A well-formed slot: consume it and resolve.
            Some(end) if after.as_bytes()[end] == b'}' && is_slot_name(&after[..end]) => {
                let name = &after[..end];
                if let Some(secret) = placeholders.get(name) {
                    out.push_str(secret);
                } else if let Some(value) = fields.lookup(name) {
                    out.push_str(value);
                }
                // Unknown slots vanish.
                rest = &after[end + 1..];
            }
            // Not a slot: emit the brace literally and move on.
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_slot_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn form_encode(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn xml_encode(params: &BTreeMap<String, String>) -> String {
    let mut out = String::from("<request>");
    for (k, v) in params {
        out.push('<');
        out.push_str(k);
        out.push('>');
        out.push_str(&xml_escape(v));
        out.push_str("</");
        out.push_str(k);
        out.push('>');
    }
    out.push_str("</request>");
    out
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
