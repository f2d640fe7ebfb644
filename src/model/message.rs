//! Message model.
//!
//! A message is immutable after creation, except `url_content` and
//! `file_storage`, which the URL fetcher collaborator may fill once.
//! Every message carries an opaque `view_token` so full content can be
//! exposed without revealing sequential ids.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;

/// Number of random bytes behind a view token (hex-encoded to 32 chars).
const VIEW_TOKEN_BYTES: usize = 16;

/// A push message accepted for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// Id of the API token that created this message.
    pub token_id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    /// Text extracted from `url` by the fetcher collaborator.
    pub url_content: Option<String>,
    /// Path to the raw fetched content, when stored.
    pub file_storage: Option<String>,
    /// Opaque random token for the public view endpoint.
    pub view_token: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message, enforcing that at least one of title, content,
    /// or url is present.
    pub fn new(
        token_id: &str,
        title: Option<String>,
        content: Option<String>,
        url: Option<String>,
    ) -> Result<Self, DispatchError> {
        let empty = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        if empty(&title) && empty(&content) && empty(&url) {
            return Err(DispatchError::MissingContent);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            token_id: token_id.to_string(),
            title,
            content,
            url,
            url_content: None,
            file_storage: None,
            view_token: generate_view_token(),
            created_at: Utc::now(),
        })
    }

    pub fn view_url(&self, base_url: &str) -> String {
        format!("{}/view/{}", base_url.trim_end_matches('/'), self.view_token)
    }
}

/// Generate an unguessable view token (32 hex chars of OS randomness).
pub fn generate_view_token() -> String {
    let mut bytes = [0u8; VIEW_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
