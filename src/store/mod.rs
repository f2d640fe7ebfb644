//! Collaborator store interfaces.
//!
//! Token/channel CRUD and persistence live outside the core; the dispatcher
//! only consumes these traits. The in-memory implementation in [`memory`]
//! backs the binary and doubles as the test fixture.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{AiChannel, AiLink, ApiToken, Channel, ChannelLink, Message};
use crate::queue::JobKind;

pub use memory::MemoryStore;

/// Resolves API token values to token rows.
#[async_trait]
pub trait TokenRepo: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<ApiToken>, StoreError>;
}

/// Read-only access to delivery channel configuration.
#[async_trait]
pub trait ChannelRepo: Send + Sync {
    /// Return the enabled channels among `ids`, in input order, without
    /// duplicates. Unknown or disabled ids are simply absent.
    async fn list_enabled(&self, ids: &[String]) -> Result<Vec<Channel>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Channel>, StoreError>;
}

/// Read-only access to AI channel configuration.
#[async_trait]
pub trait AiChannelRepo: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<AiChannel>, StoreError>;
}

/// Message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message together with all of its link rows as one atomic
    /// unit: either every row exists afterwards or none do.
    async fn create_with_links(
        &self,
        message: &Message,
        channel_links: &[ChannelLink],
        ai_link: Option<&AiLink>,
    ) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Message>, StoreError>;

    async fn get_by_view_token(&self, view_token: &str) -> Result<Option<Message>, StoreError>;

    /// Fill the fetched URL content, once. Later calls are no-ops.
    async fn fill_url_content(
        &self,
        id: Uuid,
        url_content: String,
        file_storage: Option<String>,
    ) -> Result<(), StoreError>;
}

/// How a finished channel attempt updates its link row.
#[derive(Debug, Clone)]
pub enum ChannelFinish {
    Success { sent_at: DateTime<Utc> },
    /// Terminal failure.
    Failed { error: String },
    /// Retryable failure: back to `Pending`, keeping the attempt count.
    /// The next attempt must not run before `retry_at`.
    Retry { error: String, retry_at: DateTime<Utc> },
}

/// How a finished AI attempt updates its link row.
#[derive(Debug, Clone)]
pub enum AiFinish {
    Success {
        result: String,
        prompt_used: String,
        processed_at: DateTime<Utc>,
    },
    Failed { error: String },
    Retry { error: String, retry_at: DateTime<Utc> },
}

/// Link row persistence and the atomic claim primitive.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Atomically transition a channel link from `Pending` to `Sending`,
    /// incrementing its attempt count. Returns the claimed snapshot, or
    /// `None` when the link was not `Pending` (already claimed or
    /// terminal); the caller must then perform no invocation.
    async fn claim_channel(&self, link_id: Uuid) -> Result<Option<ChannelLink>, StoreError>;

    /// Same contract for AI links (`Pending` to `Processing`).
    async fn claim_ai(&self, link_id: Uuid) -> Result<Option<AiLink>, StoreError>;

    /// Record the outcome of a claimed channel attempt. Only applies while
    /// the link is `Sending`; terminal rows are never overwritten.
    async fn finish_channel(&self, link_id: Uuid, finish: ChannelFinish)
        -> Result<(), StoreError>;

    /// Record the outcome of a claimed AI attempt.
    async fn finish_ai(&self, link_id: Uuid, finish: AiFinish) -> Result<(), StoreError>;

    async fn channel_links_for(&self, message_id: Uuid) -> Result<Vec<ChannelLink>, StoreError>;

    async fn ai_link_for(&self, message_id: Uuid) -> Result<Option<AiLink>, StoreError>;

    /// Links the recovery sweep should re-enqueue: every `Pending` row
    /// not parked behind a future `next_attempt_at`, plus
    /// `Sending`/`Processing` rows not updated since `stale_before`.
    /// Rows waiting out a retry backoff already have a delayed job
    /// scheduled and must not be picked up early.
    async fn recoverable_links(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<(JobKind, Uuid)>, StoreError>;
}
