//! Worker pool draining the job queue.
//!
//! Each worker loops on `claim_next`, claims the link row, loads the
//! channel or AI configuration and the message, runs the matching
//! invoker, and hands the outcome to the status tracker. Workers exit
//! when the queue closes.

use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::invoker::{AiInvoker, ChannelInvoker, InvokeError};
use crate::queue::{JobKind, JobQueue, LinkJob};
use crate::store::{AiChannelRepo, ChannelRepo, MessageStore};
use crate::tracker::StatusTracker;

/// Everything a worker needs to process one job.
pub struct WorkerContext {
    pub channels: Arc<dyn ChannelRepo>,
    pub ai_channels: Arc<dyn AiChannelRepo>,
    pub messages: Arc<dyn MessageStore>,
    pub tracker: Arc<StatusTracker>,
    pub channel_invoker: Arc<ChannelInvoker>,
    pub ai_invoker: Arc<AiInvoker>,
    /// Public base URL used to build view links.
    pub base_url: String,
}

/// A running pool of queue workers.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers over the shared queue.
    pub fn spawn(queue: Arc<dyn JobQueue>, ctx: Arc<WorkerContext>, count: usize) -> Self {
        let handles = (0..count)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "Worker started");
                    while let Some(job) = queue.claim_next().await {
                        process_job(&ctx, &job).await;
                        queue.ack(&job).await;
                    }
                    tracing::debug!(worker_id, "Worker stopped");
                })
            })
            .collect();
        Self { queue, handles }
    }

    /// Close the queue and wait for every worker to drain and exit.
    pub async fn shutdown(self) {
        self.queue.close();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn process_job(ctx: &WorkerContext, job: &LinkJob) {
    let result = match job.kind {
        JobKind::Channel => process_channel_job(ctx, job.link_id).await,
        JobKind::Ai => process_ai_job(ctx, job.link_id).await,
    };
    if let Err(e) = result {
        // Store errors here leave the row in `sending`; the staleness
        // sweep re-enqueues it.
        tracing::error!(link_id = %job.link_id, error = %e, "Job processing aborted");
    }
}

async fn process_channel_job(ctx: &WorkerContext, link_id: Uuid) -> crate::error::Result<()> {
    let Some(link) = ctx.tracker.claim_channel(link_id).await? else {
        tracing::debug!(%link_id, "Channel link already claimed or terminal");
        return Ok(());
    };

    let outcome = match load_channel_inputs(ctx, &link.channel_id, link.message_id).await? {
        Some((channel, message)) => {
            let view_url = message.view_url(&ctx.base_url);
            ctx.channel_invoker.invoke(&channel, &message, &view_url).await
        }
        // Configuration vanished after the link was created.
        None => Err(InvokeError::Fatal(format!(
            "channel {} not found",
            link.channel_id
        ))),
    };

    ctx.tracker.record_channel_outcome(&link, outcome).await?;
    Ok(())
}

async fn process_ai_job(ctx: &WorkerContext, link_id: Uuid) -> crate::error::Result<()> {
    let Some(link) = ctx.tracker.claim_ai(link_id).await? else {
        tracing::debug!(%link_id, "AI link already claimed or terminal");
        return Ok(());
    };

    let ai = ctx.ai_channels.get(&link.ai_channel_id).await?;
    let message = ctx.messages.get(link.message_id).await?;

    let outcome = match (ai, message) {
        (Some(ai), Some(message)) => {
            let view_url = message.view_url(&ctx.base_url);
            ctx.ai_invoker.invoke(&ai, &message, &view_url).await
        }
        _ => Err(InvokeError::Fatal(format!(
            "ai channel {} not found",
            link.ai_channel_id
        ))),
    };

    ctx.tracker.record_ai_outcome(&link, outcome).await?;
    Ok(())
}

async fn load_channel_inputs(
    ctx: &WorkerContext,
    channel_id: &str,
    message_id: Uuid,
) -> crate::error::Result<Option<(crate::model::Channel, crate::model::Message)>> {
    let channel = ctx.channels.get(channel_id).await?;
    let message = ctx.messages.get(message_id).await?;
    Ok(channel.zip(message))
}
