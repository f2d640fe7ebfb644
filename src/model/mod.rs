//! Domain types: tokens, channels, messages, and per-target link rows.

mod ai_channel;
mod channel;
mod link;
mod message;
mod token;

pub use ai_channel::{AiChannel, PromptFamily};
pub use channel::{
    Channel, ChannelKind, ContentKind, HttpMethod, RequestTemplate, DEFAULT_MAX_LENGTH,
};
pub use link::{AiLink, AiLinkStatus, ChannelLink, LinkStatus};
pub use message::{generate_view_token, Message};
pub use token::ApiToken;
