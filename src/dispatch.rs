//! Dispatch orchestration.
//!
//! [`Dispatcher::accept`] is the single entry point for a push: it
//! authenticates the token, resolves the channel and AI selections,
//! persists the message with its link rows atomically, and enqueues one
//! job per link. Delivery itself happens in the workers; accept returns
//! as soon as the work is durably recorded.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::BackpressurePolicy;
use crate::error::{DispatchError, QueueError};
use crate::fetch::UrlFetcher;
use crate::model::{AiLink, ChannelLink, Message};
use crate::queue::{JobQueue, LinkJob};
use crate::store::{AiChannelRepo, ChannelRepo, LinkStore, MessageStore, TokenRepo};

/// A push request after HTTP extraction, before authentication.
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    pub token: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    /// Channel ids, already split from the pipe-separated wire form.
    pub channels: Vec<String>,
    /// AI channel id.
    pub ai: Option<String>,
}

/// What the caller gets back from an accepted push.
#[derive(Debug, Clone)]
pub struct PushReceipt {
    pub message_id: Uuid,
    /// Channel ids that were actually linked, in request order.
    pub channels: Vec<String>,
    /// AI channel id that was linked, if any.
    pub ai: Option<String>,
    pub view_url: String,
}

/// Current delivery state of one message, for the status endpoint.
#[derive(Debug, Clone)]
pub struct MessageStatus {
    pub message: Message,
    pub channel_links: Vec<(String, ChannelLink)>,
    pub ai_link: Option<(String, AiLink)>,
}

/// Full message content for the public view page.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub message: Message,
    pub ai_result: Option<String>,
}

pub struct Dispatcher {
    tokens: Arc<dyn TokenRepo>,
    channels: Arc<dyn ChannelRepo>,
    ai_channels: Arc<dyn AiChannelRepo>,
    messages: Arc<dyn MessageStore>,
    links: Arc<dyn LinkStore>,
    queue: Arc<dyn JobQueue>,
    fetcher: Option<Arc<dyn UrlFetcher>>,
    backpressure: BackpressurePolicy,
    base_url: String,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tokens: Arc<dyn TokenRepo>,
        channels: Arc<dyn ChannelRepo>,
        ai_channels: Arc<dyn AiChannelRepo>,
        messages: Arc<dyn MessageStore>,
        links: Arc<dyn LinkStore>,
        queue: Arc<dyn JobQueue>,
        fetcher: Option<Arc<dyn UrlFetcher>>,
        backpressure: BackpressurePolicy,
        base_url: String,
    ) -> Self {
        Self {
            tokens,
            channels,
            ai_channels,
            messages,
            links,
            queue,
            fetcher,
            backpressure,
            base_url,
        }
    }

    /// Accept a push: authenticate, resolve targets, persist atomically,
    /// enqueue. Unknown or disabled channel and AI ids are dropped
    /// silently; the receipt reports what was actually linked.
    pub async fn accept(&self, request: PushRequest) -> crate::error::Result<PushReceipt> {
        let token = self
            .tokens
            .resolve(&request.token)
            .await?
            .filter(|t| t.is_usable())
            .ok_or_else(|| DispatchError::InvalidToken(clip_token(&request.token)))?;

        // Empty selections fall back to the token's defaults.
        let requested_channels = if request.channels.is_empty() {
            token.default_channels.clone()
        } else {
            request.channels
        };
        let requested_ai = request.ai.or_else(|| token.default_ai.clone());

        let channels = self.channels.list_enabled(&requested_channels).await?;
        let ai = match requested_ai {
            Some(id) => self
                .ai_channels
                .get(&id)
                .await?
                .filter(|a| a.enabled),
            None => None,
        };

        let message = Message::new(&token.id, request.title, request.content, request.url)?;

        let channel_links: Vec<ChannelLink> = channels
            .iter()
            .map(|c| ChannelLink::new(message.id, &c.id))
            .collect();
        let ai_link = ai.as_ref().map(|a| AiLink::new(message.id, &a.id));

        // Check capacity before persisting so a rejected push leaves no
        // half-dispatched rows behind.
        let jobs_needed = channel_links.len() + usize::from(ai_link.is_some());
        let enqueue = match self.backpressure {
            BackpressurePolicy::StoreOnly => true,
            BackpressurePolicy::Reject => {
                let free = self.queue.capacity().saturating_sub(self.queue.depth().await);
                if jobs_needed > free {
                    return Err(DispatchError::QueueFull {
                        capacity: self.queue.capacity(),
                    }
                    .into());
                }
                true
            }
        };

        self.messages
            .create_with_links(&message, &channel_links, ai_link.as_ref())
            .await
            .map_err(DispatchError::Store)?;

        if enqueue {
            for link in &channel_links {
                self.enqueue_best_effort(LinkJob::channel(link.id)).await;
            }
            if let Some(link) = &ai_link {
                self.enqueue_best_effort(LinkJob::ai(link.id)).await;
            }
        }

        if let (Some(fetcher), Some(url)) = (&self.fetcher, &message.url) {
            self.spawn_url_fetch(Arc::clone(fetcher), message.id, url.clone());
        }

        tracing::info!(
            message_id = %message.id,
            token_id = %token.id,
            channels = channel_links.len(),
            ai = ai_link.is_some(),
            "Push accepted"
        );

        Ok(PushReceipt {
            message_id: message.id,
            channels: channels.into_iter().map(|c| c.id).collect(),
            ai: ai.map(|a| a.id),
            view_url: message.view_url(&self.base_url),
        })
    }

    /// Current delivery state of a message. The requesting token must be
    /// the one that created the message.
    pub async fn message_status(
        &self,
        token: &str,
        message_id: Uuid,
    ) -> crate::error::Result<MessageStatus> {
        let token = self
            .tokens
            .resolve(token)
            .await?
            .filter(|t| t.is_usable())
            .ok_or_else(|| DispatchError::InvalidToken(clip_token(token)))?;

        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or(DispatchError::MessageNotFound(message_id))?;
        if message.token_id != token.id {
            // Only the creating token may read delivery state.
            return Err(DispatchError::InvalidToken(clip_token(&token.token)).into());
        }

        let mut channel_links = Vec::new();
        for link in self.links.channel_links_for(message_id).await? {
            let name = match self.channels.get(&link.channel_id).await? {
                Some(c) => c.name,
                None => link.channel_id.clone(),
            };
            channel_links.push((name, link));
        }

        let ai_link = match self.links.ai_link_for(message_id).await? {
            Some(link) => {
                let name = match self.ai_channels.get(&link.ai_channel_id).await? {
                    Some(a) => a.name,
                    None => link.ai_channel_id.clone(),
                };
                Some((name, link))
            }
            None => None,
        };

        Ok(MessageStatus {
            message,
            channel_links,
            ai_link,
        })
    }

    /// Resolve a public view token to the full message content.
    pub async fn view(&self, view_token: &str) -> crate::error::Result<MessageView> {
        let message = self
            .messages
            .get_by_view_token(view_token)
            .await?
            .ok_or(DispatchError::ViewNotFound)?;

        let ai_result = self
            .links
            .ai_link_for(message.id)
            .await?
            .and_then(|link| link.result);

        Ok(MessageView { message, ai_result })
    }

    /// Re-enqueue links abandoned by a crash or dropped under load:
    /// every pending link not waiting out a retry backoff, plus
    /// in-flight links older than `staleness`.
    pub async fn recover(&self, staleness: chrono::Duration) -> crate::error::Result<usize> {
        let stale_before = chrono::Utc::now() - staleness;
        let recoverable = self.links.recoverable_links(stale_before).await?;
        let mut enqueued = 0;
        for (kind, link_id) in recoverable {
            match self.queue.enqueue(LinkJob { kind, link_id }).await {
                Ok(()) => enqueued += 1,
                Err(QueueError::Full { .. }) => {
                    tracing::warn!("Recovery sweep stopped: queue full");
                    break;
                }
                Err(QueueError::Closed) => break,
            }
        }
        if enqueued > 0 {
            tracing::info!(enqueued, "Recovery sweep re-enqueued links");
        }
        Ok(enqueued)
    }

    /// Under `StoreOnly` backpressure the queue may refuse; the link row
    /// already exists, so the recovery sweep will deliver it.
    async fn enqueue_best_effort(&self, job: LinkJob) {
        if let Err(e) = self.queue.enqueue(job).await {
            tracing::warn!(link_id = %job.link_id, error = %e, "Enqueue deferred to recovery sweep");
        }
    }

    fn spawn_url_fetch(&self, fetcher: Arc<dyn UrlFetcher>, message_id: Uuid, url: String) {
        let messages = Arc::clone(&self.messages);
        tokio::spawn(async move {
            match fetcher.fetch(message_id, &url).await {
                Ok(content) => {
                    if let Err(e) = messages
                        .fill_url_content(message_id, content.text, content.storage_path)
                        .await
                    {
                        tracing::warn!(%message_id, error = %e, "Failed to record fetched content");
                    }
                }
                Err(e) => {
                    tracing::warn!(%message_id, url = %url, error = %e, "URL fetch failed");
                }
            }
        });
    }
}

/// Token values are secrets; log and report only a stub.
fn clip_token(token: &str) -> String {
    let head: String = token.chars().take(4).collect();
    format!("{}...", head)
}

/// Split the wire form of a channel selection: pipe-separated ids,
/// blanks removed.
pub fn parse_channel_list(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
