//! Request invokers.
//!
//! The channel invoker and the AI invoker render a template, execute the
//! outbound HTTP call, and classify the outcome. They mutate no persisted
//! state; converging the link row is the tracker's job.

mod ai;
mod channel;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::RwLock;

use crate::render::RenderedRequest;

pub use ai::{AiCompletion, AiInvoker, DefaultPrompts};
pub use channel::{truncate_with_view_link, ChannelDelivery, ChannelInvoker};

/// Upper bound on response text captured into error messages.
pub(crate) const ERROR_SNIPPET_LEN: usize = 256;

/// A classified invocation failure.
///
/// `Retryable` feeds the backoff loop (429, 5xx, connect/timeout);
/// `Fatal` is terminal (any other 4xx, malformed template output).
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvokeError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl InvokeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvokeError::Retryable(_))
    }
}

/// Shared outbound HTTP execution with per-proxy client caching.
///
/// reqwest ties a proxy to the client, so proxied channels get a cached
/// dedicated client instead of a fresh one per call.
pub struct HttpExecutor {
    direct: reqwest::Client,
    proxied: RwLock<HashMap<String, reqwest::Client>>,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            direct: reqwest::Client::new(),
            proxied: RwLock::new(HashMap::new()),
        }
    }

    async fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, InvokeError> {
        let proxy = match proxy {
            Some(p) => p,
            None => return Ok(self.direct.clone()),
        };

        {
            let cache = self.proxied.read().await;
            if let Some(client) = cache.get(proxy) {
                return Ok(client.clone());
            }
        }

        let built = reqwest::Client::builder()
            .proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| InvokeError::Fatal(format!("invalid proxy {}: {}", proxy, e)))?,
            )
            .build()
            .map_err(|e| InvokeError::Fatal(format!("proxy client build failed: {}", e)))?;

        let mut cache = self.proxied.write().await;
        Ok(cache.entry(proxy.to_string()).or_insert(built).clone())
    }

    /// Execute a rendered request and return the final status plus a
    /// bounded slice of the response body.
    pub async fn execute(
        &self,
        request: &RenderedRequest,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<(StatusCode, String), InvokeError> {
        let client = self.client_for(proxy).await?;

        let mut builder = client
            .request(request.method.into(), &request.url)
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(kind) = request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, kind.mime());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a transport error; connect failures and timeouts are retryable.
fn classify_transport(e: reqwest::Error) -> InvokeError {
    if e.is_timeout() {
        InvokeError::Retryable(format!("request timed out: {}", e))
    } else {
        InvokeError::Retryable(format!("request failed: {}", e))
    }
}

/// Classify a final HTTP status: 2xx succeeds, 429 and 5xx are retryable,
/// anything else is terminal.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> Result<(), InvokeError> {
    if status.is_success() {
        return Ok(());
    }
    let detail = format!("HTTP {}: {}", status.as_u16(), clip(body, ERROR_SNIPPET_LEN));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(InvokeError::Retryable(detail))
    } else {
        Err(InvokeError::Fatal(detail))
    }
}

/// Truncate on a char boundary.
pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
