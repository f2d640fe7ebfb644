//! Runtime configuration.
//!
//! Everything is settable as a CLI flag or a `PUSHRELAY_*` environment
//! variable; `.env` files are honored by the binary. Tokens and channel
//! definitions load from a JSON seed file at startup.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::invoker::DefaultPrompts;
use crate::model::{AiChannel, ApiToken, Channel};
use crate::tracker::RetryPolicy;

/// What happens to a push when the job queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackpressurePolicy {
    /// Reject the push outright.
    Reject,
    /// Persist the message and links but enqueue nothing; the recovery
    /// sweep delivers them once the queue drains.
    StoreOnly,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "pushrelay", about = "Push message dispatch service", version)]
pub struct Config {
    /// Socket address the HTTP API binds to.
    #[arg(long, env = "PUSHRELAY_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Public base URL used when building view links.
    #[arg(long, env = "PUSHRELAY_BASE_URL", default_value = "http://127.0.0.1:8080")]
    pub base_url: String,

    /// Number of queue workers.
    #[arg(long, env = "PUSHRELAY_WORKERS", default_value = "4")]
    pub workers: usize,

    /// Job queue capacity.
    #[arg(long, env = "PUSHRELAY_QUEUE_CAPACITY", default_value = "1024")]
    pub queue_capacity: usize,

    /// What to do with a push when the queue is full.
    #[arg(long, env = "PUSHRELAY_BACKPRESSURE", value_enum, default_value = "reject")]
    pub backpressure: BackpressurePolicy,

    /// Maximum attempts per link (1 = no retries).
    #[arg(long, env = "PUSHRELAY_MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    /// Base retry delay in milliseconds.
    #[arg(long, env = "PUSHRELAY_RETRY_BASE_MS", default_value = "500")]
    pub retry_base_ms: u64,

    /// Retry delay cap in milliseconds.
    #[arg(long, env = "PUSHRELAY_RETRY_MAX_MS", default_value = "30000")]
    pub retry_max_ms: u64,

    /// Retry jitter factor (0.0 to 1.0).
    #[arg(long, env = "PUSHRELAY_RETRY_JITTER", default_value = "0.25")]
    pub retry_jitter: f64,

    /// Per-request timeout for channel deliveries, in seconds.
    #[arg(long, env = "PUSHRELAY_CHANNEL_TIMEOUT_SECS", default_value = "10")]
    pub channel_timeout_secs: u64,

    /// Per-request timeout for AI calls, in seconds.
    #[arg(long, env = "PUSHRELAY_AI_TIMEOUT_SECS", default_value = "60")]
    pub ai_timeout_secs: u64,

    /// Timeout for URL content fetches, in seconds.
    #[arg(long, env = "PUSHRELAY_FETCH_TIMEOUT_SECS", default_value = "15")]
    pub fetch_timeout_secs: u64,

    /// Cap on extracted URL content, in chars.
    #[arg(long, env = "PUSHRELAY_FETCH_MAX_CHARS", default_value = "20000")]
    pub fetch_max_chars: usize,

    /// Directory for raw fetched pages; unset disables storage.
    #[arg(long, env = "PUSHRELAY_FILE_STORAGE_DIR")]
    pub file_storage_dir: Option<PathBuf>,

    /// Age after which an in-flight link counts as abandoned and the
    /// recovery sweep re-enqueues it, in seconds.
    #[arg(long, env = "PUSHRELAY_SENDING_STALENESS_SECS", default_value = "300")]
    pub sending_staleness_secs: u64,

    /// Default prompt for completion-style AI channels.
    #[arg(
        long,
        env = "PUSHRELAY_PROMPT_COMPLETION",
        default_value = "Summarize the following message.\n\nTitle: {title}\nContent: {content}\n{url_content}"
    )]
    pub prompt_completion: String,

    /// Default prompt for local-model AI channels.
    #[arg(
        long,
        env = "PUSHRELAY_PROMPT_LOCAL_MODEL",
        default_value = "Summarize: {title} {content} {url_content}"
    )]
    pub prompt_local_model: String,

    /// JSON seed file with tokens, channels, and AI channels.
    #[arg(long, env = "PUSHRELAY_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.retry_base_ms,
            max_delay_ms: self.retry_max_ms,
            jitter_factor: self.retry_jitter,
        }
    }

    pub fn default_prompts(&self) -> DefaultPrompts {
        DefaultPrompts {
            completion: self.prompt_completion.clone(),
            local_model: self.prompt_local_model.clone(),
        }
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn sending_staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sending_staleness_secs as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(ConfigError::InvalidValue {
                key: "retry_jitter".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        url::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "base_url".to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Tokens and channel definitions loaded at startup.
#[derive(Debug, Default, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub tokens: Vec<ApiToken>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub ai_channels: Vec<AiChannel>,
}

impl SeedConfig {
    /// Load and parse a seed file. A malformed file is a startup error,
    /// not something to limp past.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ConfigError::ParseError(format!("{}: {}", path.display(), e))
        })
    }

    /// Ids that occur more than once within their table, for startup
    /// validation.
    pub fn duplicate_ids(&self) -> Vec<String> {
        fn dupes<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for id in ids {
                *counts.entry(id).or_default() += 1;
            }
            counts
                .into_iter()
                .filter(|(_, n)| *n > 1)
                .map(|(id, _)| id.to_string())
                .collect()
        }
        let mut out = dupes(self.tokens.iter().map(|t| t.id.as_str()));
        out.extend(dupes(self.channels.iter().map(|c| c.id.as_str())));
        out.extend(dupes(self.ai_channels.iter().map(|a| a.id.as_str())));
        out
    }
}
