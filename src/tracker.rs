//! Delivery status tracking and retry policy.
//!
//! Each link row walks a small state machine: `pending` to
//! `sending`/`processing` on claim, then to `success`, `failed`, or back
//! to `pending` when the failure is retryable and attempts remain.
//! Retryable failures are re-enqueued after an exponential backoff with
//! jitter.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::invoker::{clip, AiCompletion, ChannelDelivery, InvokeError};
use crate::model::{AiLink, ChannelLink};
use crate::queue::{enqueue_after, JobQueue, LinkJob};
use crate::store::{AiFinish, ChannelFinish, LinkStore};

/// Upper bound on error text persisted into a link row.
const STORED_ERROR_LEN: usize = 500;

/// Retry behavior for failed attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per link (1 = no retries).
    pub max_attempts: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (milliseconds).
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0) - randomness added to delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt. `attempt` is the count already
    /// made, so the first retry (attempt 1) waits roughly the base delay.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * 2^(attempt - 1)
        let exp_delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX));
        let capped_delay_ms = exp_delay_ms.min(self.max_delay_ms);

        // Apply jitter: add random value in [0, jitter_factor * delay]
        let jitter_range = (capped_delay_ms as f64 * self.jitter_factor) as u64;
        let jitter = if jitter_range > 0 {
            // Clock-derived pseudo-randomness is enough to decorrelate
            // retries without pulling an RNG into this path.
            let seed = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64;
            seed % (jitter_range + 1)
        } else {
            0
        };

        Duration::from_millis(capped_delay_ms.saturating_add(jitter))
    }
}

/// Applies attempt outcomes to link rows and schedules retries.
pub struct StatusTracker {
    links: Arc<dyn LinkStore>,
    queue: Arc<dyn JobQueue>,
    policy: RetryPolicy,
}

impl StatusTracker {
    pub fn new(links: Arc<dyn LinkStore>, queue: Arc<dyn JobQueue>, policy: RetryPolicy) -> Self {
        Self {
            links,
            queue,
            policy,
        }
    }

    /// Claim a channel link for one attempt. `None` means another worker
    /// got there first, or the link is already terminal.
    pub async fn claim_channel(&self, link_id: Uuid) -> Result<Option<ChannelLink>, StoreError> {
        self.links.claim_channel(link_id).await
    }

    /// Claim an AI link for one attempt.
    pub async fn claim_ai(&self, link_id: Uuid) -> Result<Option<AiLink>, StoreError> {
        self.links.claim_ai(link_id).await
    }

    /// Record a channel attempt outcome against a claimed link.
    pub async fn record_channel_outcome(
        &self,
        link: &ChannelLink,
        outcome: Result<ChannelDelivery, InvokeError>,
    ) -> Result<(), StoreError> {
        match outcome {
            Ok(delivery) => {
                tracing::info!(
                    link_id = %link.id,
                    message_id = %link.message_id,
                    channel_id = %link.channel_id,
                    attempt = link.attempt_count,
                    "Channel delivery succeeded"
                );
                self.links
                    .finish_channel(
                        link.id,
                        ChannelFinish::Success {
                            sent_at: delivery.sent_at,
                        },
                    )
                    .await
            }
            Err(err) => {
                let finish = match self.next_step(link.attempt_count, &err) {
                    NextStep::Retry(delay) => {
                        tracing::warn!(
                            link_id = %link.id,
                            channel_id = %link.channel_id,
                            attempt = link.attempt_count,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Channel delivery failed, retrying"
                        );
                        enqueue_after(Arc::clone(&self.queue), LinkJob::channel(link.id), delay);
                        ChannelFinish::Retry {
                            error: clip(&err.to_string(), STORED_ERROR_LEN),
                            retry_at: retry_at(delay),
                        }
                    }
                    NextStep::GiveUp => {
                        tracing::error!(
                            link_id = %link.id,
                            channel_id = %link.channel_id,
                            attempt = link.attempt_count,
                            error = %err,
                            "Channel delivery failed permanently"
                        );
                        ChannelFinish::Failed {
                            error: clip(&err.to_string(), STORED_ERROR_LEN),
                        }
                    }
                };
                self.links.finish_channel(link.id, finish).await
            }
        }
    }

    /// Record an AI attempt outcome against a claimed link.
    pub async fn record_ai_outcome(
        &self,
        link: &AiLink,
        outcome: Result<AiCompletion, InvokeError>,
    ) -> Result<(), StoreError> {
        match outcome {
            Ok(completion) => {
                tracing::info!(
                    link_id = %link.id,
                    message_id = %link.message_id,
                    ai_channel_id = %link.ai_channel_id,
                    attempt = link.attempt_count,
                    "AI processing succeeded"
                );
                self.links
                    .finish_ai(
                        link.id,
                        AiFinish::Success {
                            result: completion.result,
                            prompt_used: completion.prompt_used,
                            processed_at: completion.processed_at,
                        },
                    )
                    .await
            }
            Err(err) => {
                let finish = match self.next_step(link.attempt_count, &err) {
                    NextStep::Retry(delay) => {
                        tracing::warn!(
                            link_id = %link.id,
                            ai_channel_id = %link.ai_channel_id,
                            attempt = link.attempt_count,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "AI processing failed, retrying"
                        );
                        enqueue_after(Arc::clone(&self.queue), LinkJob::ai(link.id), delay);
                        AiFinish::Retry {
                            error: clip(&err.to_string(), STORED_ERROR_LEN),
                            retry_at: retry_at(delay),
                        }
                    }
                    NextStep::GiveUp => {
                        tracing::error!(
                            link_id = %link.id,
                            ai_channel_id = %link.ai_channel_id,
                            attempt = link.attempt_count,
                            error = %err,
                            "AI processing failed permanently"
                        );
                        AiFinish::Failed {
                            error: clip(&err.to_string(), STORED_ERROR_LEN),
                        }
                    }
                };
                self.links.finish_ai(link.id, finish).await
            }
        }
    }

    fn next_step(&self, attempt_count: u32, err: &InvokeError) -> NextStep {
        if err.is_retryable() && attempt_count < self.policy.max_attempts {
            NextStep::Retry(self.policy.backoff_delay(attempt_count))
        } else {
            NextStep::GiveUp
        }
    }
}

enum NextStep {
    Retry(Duration),
    GiveUp,
}

/// Wall-clock time the scheduled retry job will fire, recorded on the
/// link row so the recovery sweep does not re-enqueue it early.
fn retry_at(delay: Duration) -> chrono::DateTime<chrono::Utc> {
    // Delays are capped by the policy; a delay chrono cannot represent
    // collapses to a day rather than panicking.
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1));
    chrono::Utc::now() + delay
}
