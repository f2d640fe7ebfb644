//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::Request;
use axum::response::Html;
use axum::{Form, Json, RequestExt};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::dispatch::{parse_channel_list, Dispatcher, PushRequest};
use crate::error::{DispatchError, Error};
use crate::model::{AiLink, ChannelLink, Message};

use super::response::ApiResponse;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Wire form of a push, shared by the JSON body, form body, and query
/// string variants.
#[derive(Debug, Default, Deserialize)]
pub struct PushParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Pipe-separated channel ids, e.g. `1|3`.
    #[serde(default)]
    pub channels: Option<String>,
    #[serde(default)]
    pub ai: Option<String>,
}

impl PushParams {
    fn into_request(self) -> Result<PushRequest, DispatchError> {
        let token = self
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DispatchError::InvalidToken("(missing)".to_string()))?;
        Ok(PushRequest {
            token,
            title: self.title,
            content: self.content,
            url: self.url,
            channels: self
                .channels
                .as_deref()
                .map(parse_channel_list)
                .unwrap_or_default(),
            ai: self.ai.filter(|a| !a.trim().is_empty()),
        })
    }
}

/// `POST /push` accepts both JSON and form bodies.
pub async fn push_post(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
) -> Result<ApiResponse, Error> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    let params: PushParams = if is_json {
        let Json(params) = request
            .extract()
            .await
            .map_err(|_| DispatchError::MissingContent)?;
        params
    } else {
        let Form(params) = request
            .extract()
            .await
            .map_err(|_| DispatchError::MissingContent)?;
        params
    };

    push(state, params).await
}

/// `GET /push` with the same parameters in the query string.
pub async fn push_get(
    State(state): State<AppState>,
    Query(params): Query<PushParams>,
) -> Result<ApiResponse, Error> {
    push(state, params).await
}

async fn push(state: AppState, params: PushParams) -> Result<ApiResponse, Error> {
    let request = params.into_request()?;
    let receipt = state.dispatcher.accept(request).await?;
    Ok(ApiResponse::ok(json!({
        "message_id": receipt.message_id,
        "channels": receipt.channels,
        "ai": receipt.ai,
        "view_url": receipt.view_url,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub token: String,
}

/// `GET /message/{id}?token=...`
pub async fn message_status(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<ApiResponse, Error> {
    let status = state
        .dispatcher
        .message_status(&query.token, message_id)
        .await?;

    Ok(ApiResponse::ok(json!({
        "message": message_summary(&status.message),
        "channels": status
            .channel_links
            .iter()
            .map(|(name, link)| channel_link_summary(name, link))
            .collect::<Vec<_>>(),
        "ai": status
            .ai_link
            .as_ref()
            .map(|(name, link)| ai_link_summary(name, link)),
    })))
}

/// `GET /view/{view_token}`: the public full-content page.
pub async fn view(
    State(state): State<AppState>,
    Path(view_token): Path<String>,
) -> Result<Html<String>, Error> {
    let view = state.dispatcher.view(&view_token).await?;
    Ok(Html(render_view_page(&view.message, view.ai_result.as_deref())))
}

fn message_summary(message: &Message) -> serde_json::Value {
    json!({
        "id": message.id,
        "title": message.title,
        "content": message.content,
        "url": message.url,
        "created_at": message.created_at,
    })
}

fn channel_link_summary(name: &str, link: &ChannelLink) -> serde_json::Value {
    json!({
        "id": link.channel_id,
        "name": name,
        "status": link.status.to_string(),
        "attempts": link.attempt_count,
        "error": link.error,
        "sent_at": link.sent_at,
    })
}

fn ai_link_summary(name: &str, link: &AiLink) -> serde_json::Value {
    json!({
        "id": link.ai_channel_id,
        "name": name,
        "status": link.status.to_string(),
        "attempts": link.attempt_count,
        "result": link.result,
        "error": link.error,
        "processed_at": link.processed_at,
    })
}

fn render_view_page(message: &Message, ai_result: Option<&str>) -> String {
    let title = html_escape(message.title.as_deref().unwrap_or("Message"));
    let mut sections = String::new();
    if let Some(content) = &message.content {
        sections.push_str(&format!(
            "<section><h2>Content</h2><pre>{}</pre></section>",
            html_escape(content)
        ));
    }
    if let Some(url) = &message.url {
        let escaped = html_escape(url);
        sections.push_str(&format!(
            "<section><h2>Link</h2><a href=\"{}\" rel=\"noreferrer\">{}</a></section>",
            escaped, escaped
        ));
    }
    if let Some(url_content) = &message.url_content {
        sections.push_str(&format!(
            "<section><h2>Page content</h2><pre>{}</pre></section>",
            html_escape(url_content)
        ));
    }
    if let Some(result) = ai_result {
        sections.push_str(&format!(
            "<section><h2>AI summary</h2><pre>{}</pre></section>",
            html_escape(result)
        ));
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1>{sections}<footer>{created}</footer></body></html>",
        title = title,
        sections = sections,
        created = message.created_at.to_rfc3339(),
    )
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
