//! HTTP API surface.
//!
//! Three routes: push submission, per-message delivery status, and the
//! public view page. Everything except the view page answers with the
//! `{code, message, data}` envelope.

mod response;
mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::dispatch::Dispatcher;

pub use response::{
    ApiResponse, CODE_INVALID_TOKEN, CODE_MESSAGE_NOT_FOUND, CODE_OK, CODE_PARAMETER_ERROR,
    CODE_SEND_FAILED, CODE_UNKNOWN_AI, CODE_UNKNOWN_CHANNEL,
};
pub use routes::AppState;

/// Build the application router.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = AppState { dispatcher };
    Router::new()
        .route("/push", get(routes::push_get).post(routes::push_post))
        .route("/message/{message_id}", get(routes::message_status))
        .route("/view/{view_token}", get(routes::view))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
