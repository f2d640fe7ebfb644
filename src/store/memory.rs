//! In-memory store backing all collaborator traits.
//!
//! One `RwLock` guards every table, so `create_with_links` and the
//! claim transitions are atomic with respect to each other. Channel and
//! AI-channel rows are validated when registered, so malformed templates
//! never reach the invokers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, TemplateError};
use crate::model::{
    AiChannel, AiLink, AiLinkStatus, ApiToken, Channel, ChannelLink, LinkStatus, Message,
};
use crate::queue::JobKind;
use crate::store::{AiChannelRepo, AiFinish, ChannelFinish, ChannelRepo, LinkStore, MessageStore, TokenRepo};

#[derive(Default)]
struct Tables {
    tokens: HashMap<String, ApiToken>,
    channels: HashMap<String, Channel>,
    ai_channels: HashMap<String, AiChannel>,
    messages: HashMap<Uuid, Message>,
    view_tokens: HashMap<String, Uuid>,
    channel_links: HashMap<Uuid, ChannelLink>,
    ai_links: HashMap<Uuid, AiLink>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token. Configuration, not dispatch: tokens are external
    /// collaborator data loaded at startup.
    pub async fn add_token(&self, token: ApiToken) {
        let mut t = self.tables.write().await;
        t.tokens.insert(token.id.clone(), token);
    }

    /// Register a channel after validating its template.
    pub async fn add_channel(&self, channel: Channel) -> Result<(), TemplateError> {
        channel.validate()?;
        let mut t = self.tables.write().await;
        t.channels.insert(channel.id.clone(), channel);
        Ok(())
    }

    /// Register an AI channel after validating its template.
    pub async fn add_ai_channel(&self, channel: AiChannel) -> Result<(), TemplateError> {
        channel.validate()?;
        let mut t = self.tables.write().await;
        t.ai_channels.insert(channel.id.clone(), channel);
        Ok(())
    }
}

#[async_trait]
impl TokenRepo for MemoryStore {
    async fn resolve(&self, token: &str) -> Result<Option<ApiToken>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.tokens.values().find(|row| row.token == token).cloned())
    }
}

#[async_trait]
impl ChannelRepo for MemoryStore {
    async fn list_enabled(&self, ids: &[String]) -> Result<Vec<Channel>, StoreError> {
        let t = self.tables.read().await;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(channel) = t.channels.get(id) {
                if channel.enabled {
                    out.push(channel.clone());
                }
            }
        }
        Ok(out)
    }

    async fn get(&self, id: &str) -> Result<Option<Channel>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.channels.get(id).cloned())
    }
}

#[async_trait]
impl AiChannelRepo for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<AiChannel>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.ai_channels.get(id).cloned())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_with_links(
        &self,
        message: &Message,
        channel_links: &[ChannelLink],
        ai_link: Option<&AiLink>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if t.messages.contains_key(&message.id) {
            return Err(StoreError::Conflict(format!(
                "message {} already exists",
                message.id
            )));
        }
        if t.view_tokens.contains_key(&message.view_token) {
            return Err(StoreError::Conflict("view token collision".to_string()));
        }
        t.messages.insert(message.id, message.clone());
        t.view_tokens.insert(message.view_token.clone(), message.id);
        for link in channel_links {
            t.channel_links.insert(link.id, link.clone());
        }
        if let Some(link) = ai_link {
            t.ai_links.insert(link.id, link.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.messages.get(&id).cloned())
    }

    async fn get_by_view_token(&self, view_token: &str) -> Result<Option<Message>, StoreError> {
        let t = self.tables.read().await;
        let id = match t.view_tokens.get(view_token) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(t.messages.get(&id).cloned())
    }

    async fn fill_url_content(
        &self,
        id: Uuid,
        url_content: String,
        file_storage: Option<String>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let message = t.messages.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "message".to_string(),
            id: id.to_string(),
        })?;
        if message.url_content.is_some() {
            // Fill-once: a second fetch result is dropped.
            return Ok(());
        }
        message.url_content = Some(url_content);
        message.file_storage = file_storage;
        Ok(())
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn claim_channel(&self, link_id: Uuid) -> Result<Option<ChannelLink>, StoreError> {
        let mut t = self.tables.write().await;
        let link = match t.channel_links.get_mut(&link_id) {
            Some(link) => link,
            None => return Ok(None),
        };
        if link.status != LinkStatus::Pending {
            return Ok(None);
        }
        link.status = LinkStatus::Sending;
        link.attempt_count += 1;
        link.next_attempt_at = None;
        link.updated_at = Utc::now();
        Ok(Some(link.clone()))
    }

    async fn claim_ai(&self, link_id: Uuid) -> Result<Option<AiLink>, StoreError> {
        let mut t = self.tables.write().await;
        let link = match t.ai_links.get_mut(&link_id) {
            Some(link) => link,
            None => return Ok(None),
        };
        if link.status != AiLinkStatus::Pending {
            return Ok(None);
        }
        link.status = AiLinkStatus::Processing;
        link.attempt_count += 1;
        link.next_attempt_at = None;
        link.updated_at = Utc::now();
        Ok(Some(link.clone()))
    }

    async fn finish_channel(
        &self,
        link_id: Uuid,
        finish: ChannelFinish,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let link = t
            .channel_links
            .get_mut(&link_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "channel_link".to_string(),
                id: link_id.to_string(),
            })?;
        // Only a claimed link can finish; terminal rows stay as they are.
        if link.status != LinkStatus::Sending {
            return Ok(());
        }
        match finish {
            ChannelFinish::Success { sent_at } => {
                link.status = LinkStatus::Success;
                link.sent_at = Some(sent_at);
                link.error = None;
            }
            ChannelFinish::Failed { error } => {
                link.status = LinkStatus::Failed;
                link.error = Some(error);
            }
            ChannelFinish::Retry { error, retry_at } => {
                link.status = LinkStatus::Pending;
                link.error = Some(error);
                link.next_attempt_at = Some(retry_at);
            }
        }
        link.updated_at = Utc::now();
        Ok(())
    }

    async fn finish_ai(&self, link_id: Uuid, finish: AiFinish) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let link = t.ai_links.get_mut(&link_id).ok_or_else(|| StoreError::NotFound {
            entity: "ai_link".to_string(),
            id: link_id.to_string(),
        })?;
        if link.status != AiLinkStatus::Processing {
            return Ok(());
        }
        match finish {
            AiFinish::Success {
                result,
                prompt_used,
                processed_at,
            } => {
                link.status = AiLinkStatus::Success;
                link.result = Some(result);
                link.prompt_used = Some(prompt_used);
                link.processed_at = Some(processed_at);
                link.error = None;
            }
            AiFinish::Failed { error } => {
                link.status = AiLinkStatus::Failed;
                link.error = Some(error);
            }
            AiFinish::Retry { error, retry_at } => {
                link.status = AiLinkStatus::Pending;
                link.error = Some(error);
                link.next_attempt_at = Some(retry_at);
            }
        }
        link.updated_at = Utc::now();
        Ok(())
    }

    async fn channel_links_for(&self, message_id: Uuid) -> Result<Vec<ChannelLink>, StoreError> {
        let t = self.tables.read().await;
        let mut links: Vec<ChannelLink> = t
            .channel_links
            .values()
            .filter(|l| l.message_id == message_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        Ok(links)
    }

    async fn ai_link_for(&self, message_id: Uuid) -> Result<Option<AiLink>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.ai_links
            .values()
            .find(|l| l.message_id == message_id)
            .cloned())
    }

    async fn recoverable_links(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<(JobKind, Uuid)>, StoreError> {
        let t = self.tables.read().await;
        let now = Utc::now();
        let mut out = Vec::new();
        for link in t.channel_links.values() {
            // A pending row with a future next_attempt_at is parked
            // behind a scheduled retry, not stranded.
            let stranded = (link.status == LinkStatus::Pending
                && link.next_attempt_at.map_or(true, |at| at <= now))
                || (link.status == LinkStatus::Sending && link.updated_at < stale_before);
            if stranded {
                out.push((JobKind::Channel, link.id));
            }
        }
        for link in t.ai_links.values() {
            let stranded = (link.status == AiLinkStatus::Pending
                && link.next_attempt_at.map_or(true, |at| at <= now))
                || (link.status == AiLinkStatus::Processing && link.updated_at < stale_before);
            if stranded {
                out.push((JobKind::Ai, link.id));
            }
        }
        Ok(out)
    }
}
