//! Error types for pushrelay.

use uuid::Uuid;

/// Top-level error type for the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backing-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Channel/AI-channel template validation errors, raised at load time.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Invalid API URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Template field {field} is invalid: {message}")]
    InvalidField { field: String, message: String },

    #[error("Method {method} requires a content type")]
    MissingContentType { method: String },

    #[error("Invalid proxy {proxy}: {reason}")]
    InvalidProxy { proxy: String, reason: String },
}

/// Errors producing a concrete request from a template.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Rendered URL is invalid: {0}")]
    InvalidUrl(String),

    #[error("Body serialization failed: {0}")]
    Serialization(String),
}

/// Job queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue full: {size}/{capacity}")]
    Full { size: usize, capacity: usize },

    #[error("Queue is closed")]
    Closed,
}

/// Errors surfaced by the dispatch orchestrator.
///
/// Each variant maps onto an API result code via [`DispatchError::api_code`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid API token: {0}")]
    InvalidToken(String),

    #[error("At least one of title, content, or url is required")]
    MissingContent,

    #[error("Message {0} not found")]
    MessageNotFound(Uuid),

    #[error("View token does not resolve")]
    ViewNotFound,

    #[error("Dispatch queue at capacity ({capacity}), retry later")]
    QueueFull { capacity: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// API result code for this error (see the `api::CODE_*` constants).
    pub fn api_code(&self) -> u32 {
        match self {
            DispatchError::InvalidToken(_) => 1001,
            DispatchError::MissingContent => 1002,
            DispatchError::QueueFull { .. } | DispatchError::Store(_) => 1005,
            DispatchError::MessageNotFound(_) | DispatchError::ViewNotFound => 1006,
        }
    }
}

/// URL content fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid fetch URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch request failed: {0}")]
    Request(String),

    #[error("Fetch returned HTTP {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the dispatcher.
pub type Result<T> = std::result::Result<T, Error>;
