//! API token model.
//!
//! A token authenticates a push caller and carries the caller's default
//! delivery targets. Token CRUD lives outside the core; the dispatcher
//! only reads tokens through the `TokenRepo` trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An API access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    /// Stable identifier, referenced by messages.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// The secret token value presented by callers.
    pub token: String,
    /// Channel ids used when a push names none.
    #[serde(default)]
    pub default_channels: Vec<String>,
    /// AI channel id used when a push names none.
    #[serde(default)]
    pub default_ai: Option<String>,
    /// Optional expiry; `None` never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ApiToken {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => at <= Utc::now(),
            None => false,
        }
    }

    /// A token is usable when it is enabled and not expired.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.is_expired()
    }
}
