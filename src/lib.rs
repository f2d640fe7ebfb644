//! pushrelay: a push-message dispatch service.
//!
//! Accepts messages over a small HTTP API and fans them out to
//! configured delivery channels (Telegram, Bark, arbitrary webhooks)
//! described entirely by request templates, optionally running each
//! message through an AI channel for summarization. Delivery is
//! asynchronous: accepted messages are persisted with one link row per
//! target, queued, and worked off by a pool with retry, backoff, and a
//! recovery sweep for at-least-once delivery.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod invoker;
pub mod model;
pub mod queue;
pub mod render;
pub mod store;
pub mod tracker;
pub mod worker;

pub use config::{BackpressurePolicy, Config, SeedConfig};
pub use dispatch::{Dispatcher, PushReceipt, PushRequest};
pub use error::{Error, Result};
