//! Per-target tracking rows.
//!
//! Each accepted push fans out to one `ChannelLink` per delivery channel
//! and at most one `AiLink`. Links are created `Pending`, claimed to
//! `Sending`/`Processing` by exactly one worker, and converge to `Success`
//! or `Failed`. Terminal states are never overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery state of a channel link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Sending,
    Success,
    Failed,
}

impl LinkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkStatus::Success | LinkStatus::Failed)
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Sending => "sending",
            LinkStatus::Success => "success",
            LinkStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Enrichment state of an AI link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiLinkStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl AiLinkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AiLinkStatus::Success | AiLinkStatus::Failed)
    }
}

impl std::fmt::Display for AiLinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AiLinkStatus::Pending => "pending",
            AiLinkStatus::Processing => "processing",
            AiLinkStatus::Success => "success",
            AiLinkStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Delivery tracking row for one (message, channel) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLink {
    pub id: Uuid,
    pub message_id: Uuid,
    pub channel_id: String,
    pub status: LinkStatus,
    /// Attempts made so far; incremented when a worker claims the link.
    pub attempt_count: u32,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Earliest time the next attempt may run. Set while the link waits
    /// out a retry backoff so the recovery sweep leaves it alone.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Last state transition, used by the recovery sweep to spot links
    /// stuck in `Sending`.
    pub updated_at: DateTime<Utc>,
}

impl ChannelLink {
    pub fn new(message_id: Uuid, channel_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id,
            channel_id: channel_id.to_string(),
            status: LinkStatus::Pending,
            attempt_count: 0,
            error: None,
            sent_at: None,
            next_attempt_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// Enrichment tracking row for one (message, AI channel) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiLink {
    pub id: Uuid,
    pub message_id: Uuid,
    pub ai_channel_id: String,
    pub status: AiLinkStatus,
    pub attempt_count: u32,
    /// The composed prompt actually sent to the model.
    pub prompt_used: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AiLink {
    pub fn new(message_id: Uuid, ai_channel_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id,
            ai_channel_id: ai_channel_id.to_string(),
            status: AiLinkStatus::Pending,
            attempt_count: 0,
            prompt_used: None,
            result: None,
            error: None,
            processed_at: None,
            next_attempt_at: None,
            updated_at: Utc::now(),
        }
    }
}
