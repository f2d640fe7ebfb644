//! URL content fetching.
//!
//! When a message carries a `url`, a background task fetches the page
//! text so templates can reference `{url_content}` and the view page can
//! show it. Fetching is best-effort: dispatch never waits on it and a
//! failure only logs.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::FetchError;
use crate::invoker::clip;

/// Content pulled from a message's URL.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// Extracted text, bounded by the configured maximum.
    pub text: String,
    /// Where the raw response was stored, when storage is configured.
    pub storage_path: Option<String>,
}

/// Fetches the content behind a message URL.
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn fetch(&self, message_id: Uuid, url: &str) -> Result<FetchedContent, FetchError>;
}

/// HTTP-backed fetcher with optional raw-content storage.
pub struct HttpUrlFetcher {
    client: reqwest::Client,
    timeout: Duration,
    /// Cap on extracted text, in chars.
    max_chars: usize,
    /// Directory for raw fetched pages; `None` disables storage.
    storage_dir: Option<PathBuf>,
}

impl HttpUrlFetcher {
    pub fn new(timeout: Duration, max_chars: usize, storage_dir: Option<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_chars,
            storage_dir,
        }
    }

    async fn store_raw(&self, message_id: Uuid, raw: &str) -> Option<String> {
        let dir = self.storage_dir.as_ref()?;
        let path = dir.join(format!("{}.html", message_id));
        match tokio::fs::write(&path, raw).await {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                tracing::warn!(%message_id, error = %e, "Failed to store fetched content");
                None
            }
        }
    }
}

#[async_trait]
impl UrlFetcher for HttpUrlFetcher {
    async fn fetch(&self, message_id: Uuid, url: &str) -> Result<FetchedContent, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let storage_path = self.store_raw(message_id, &raw).await;

        Ok(FetchedContent {
            text: clip(&strip_markup(&raw), self.max_chars),
            storage_path,
        })
    }
}

/// Reduce an HTML page to readable text: drop script and style blocks,
/// strip remaining tags, collapse whitespace. Not a real HTML parser,
/// but enough for template substitution and the view page.
fn strip_markup(html: &str) -> String {
    let without_blocks = drop_element_blocks(html, &["script", "style"]);

    let mut text = String::with_capacity(without_blocks.len());
    let mut in_tag = false;
    for c in without_blocks.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn drop_element_blocks(html: &str, elements: &[&str]) -> String {
    // ASCII lowering keeps byte offsets aligned with the source.
    let lower = html.to_ascii_lowercase();
    let mut keep = vec![true; html.len()];
    for element in elements {
        let open = format!("<{}", element);
        let close = format!("</{}>", element);
        let mut from = 0;
        while let Some(start) = lower[from..].find(&open) {
            let start = from + start;
            let end = match lower[start..].find(&close) {
                Some(offset) => start + offset + close.len(),
                None => lower.len(),
            };
            for flag in &mut keep[start..end] {
                *flag = false;
            }
            from = end;
        }
    }
    html.char_indices()
        .filter(|(i, _)| keep[*i])
        .map(|(_, c)| c)
        .collect()
}
