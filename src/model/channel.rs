//! Delivery channel model and request templates.
//!
//! A channel is a configured HTTP delivery target: Telegram bot, Bark
//! endpoint, generic webhook, and so on. The dispatcher never carries
//! channel-specific business logic; everything a target needs is expressed
//! in a [`RequestTemplate`] whose placeholders are filled at render time.
//!
//! Templates are validated once at load time via [`Channel::validate`],
//! not ad hoc on every invocation, so malformed configuration is rejected
//! before it can reach the invoker.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TemplateError;

/// Default payload cap when a channel does not set one.
pub const DEFAULT_MAX_LENGTH: usize = 2000;

/// HTTP method understood by channel templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Post
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Body encoding for a rendered request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Form,
    Xml,
}

impl ContentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Json => "application/json",
            ContentKind::Form => "application/x-www-form-urlencoded",
            ContentKind::Xml => "application/xml",
        }
    }
}

/// Tag describing what kind of target a channel is.
///
/// The dispatcher treats all kinds uniformly; the tag exists so operators
/// and the UI can group channels, and so unknown kinds round-trip intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    Bark,
    Webhook,
    #[serde(untagged)]
    Other(String),
}

impl Default for ChannelKind {
    fn default() -> Self {
        ChannelKind::Webhook
    }
}

/// Immutable per-channel request template.
///
/// `params` and `headers` values may reference placeholders: slots named
/// in `placeholders` (secrets such as API keys) and the message fields
/// `{title}`, `{content}`, `{url}`, `{url_content}`, `{view_url}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub api_url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Body encoding; `None` folds params into the URL query string.
    #[serde(default)]
    pub content_type: Option<ContentKind>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Secret substitution slots, filled before any message field.
    #[serde(default)]
    pub placeholders: BTreeMap<String, String>,
    /// Outbound proxy URL, e.g. `http://127.0.0.1:7890`.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl RequestTemplate {
    /// Validate the template schema. Called once when configuration loads.
    pub fn validate(&self) -> Result<(), TemplateError> {
        Url::parse(&self.api_url).map_err(|e| TemplateError::InvalidUrl {
            url: self.api_url.clone(),
            reason: e.to_string(),
        })?;

        if self.method != HttpMethod::Get && self.content_type.is_none() {
            return Err(TemplateError::MissingContentType {
                method: self.method.to_string(),
            });
        }

        for name in self.headers.keys() {
            if name.trim().is_empty() {
                return Err(TemplateError::InvalidField {
                    field: "headers".to_string(),
                    message: "empty header name".to_string(),
                });
            }
        }

        if let Some(proxy) = &self.proxy {
            reqwest::Proxy::all(proxy).map_err(|e| TemplateError::InvalidProxy {
                proxy: proxy.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

/// A configured delivery channel. Read-only to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    pub template: RequestTemplate,
    /// Cap on the textual payload; longer content is truncated behind
    /// the view link.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_enabled() -> bool {
    true
}

impl Channel {
    /// Validate the channel configuration at load time.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.id.trim().is_empty() {
            return Err(TemplateError::InvalidField {
                field: "id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.max_length == 0 {
            return Err(TemplateError::InvalidField {
                field: "max_length".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        self.template.validate()
    }
}
