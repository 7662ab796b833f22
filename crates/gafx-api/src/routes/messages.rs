//! # Message Routes
//!
//! The per-order chat.
//!
//! ## Endpoints
//!
//! - `GET /v1/orders/{id}/messages?after=N&limit=M` — messages after `N`
//! - `POST /v1/orders/{id}/messages` — post a text or attachment message
//!
//! Clients poll with `after` set to the `next_after` of the previous page.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use gafx_core::OrderId;
use gafx_escrow::{AttachmentKind, Message, MessageBody};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::routes::on_engine;
use crate::state::AppState;

const MAX_PAGE: usize = 500;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Content of a message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBodyView {
    Text {
        text: String,
    },
    Attachment {
        name: String,
        mime: String,
        size: u64,
        /// "image" or "file".
        kind: String,
    },
}

impl From<&MessageBody> for MessageBodyView {
    fn from(body: &MessageBody) -> Self {
        match body {
            MessageBody::Text { text } => Self::Text { text: text.clone() },
            MessageBody::Attachment {
                name,
                mime,
                size,
                kind,
            } => Self::Attachment {
                name: name.clone(),
                mime: mime.clone(),
                size: *size,
                kind: match kind {
                    AttachmentKind::Image => "image",
                    AttachmentKind::File => "file",
                }
                .to_string(),
            },
        }
    }
}

/// A chat message as returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageView {
    pub seq: u64,
    pub order_id: Uuid,
    pub sender_id: Uuid,
    /// buyer, seller, admin, or system.
    pub sender_role: String,
    pub body: MessageBodyView,
    pub sent_at: DateTime<Utc>,
}

impl From<&Message> for MessageView {
    fn from(m: &Message) -> Self {
        Self {
            seq: m.seq,
            order_id: *m.order_id.as_uuid(),
            sender_id: *m.sender_id.as_uuid(),
            sender_role: m.sender_role.as_str().to_string(),
            body: MessageBodyView::from(&m.body),
            sent_at: m.sent_at,
        }
    }
}

/// One page of messages.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagePage {
    pub items: Vec<MessageView>,
    /// Pass as `after` to fetch the next page.
    pub next_after: u64,
    /// Whether messages after `next_after` were still held when this page
    /// was read.
    pub has_more: bool,
}

/// Request to post a message. Attachment bytes are uploaded to blob
/// storage separately; only metadata is posted here.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SendMessageRequest {
    Text { text: String },
    Attachment { name: String, mime: String, size: u64 },
}

impl From<SendMessageRequest> for MessageBody {
    fn from(req: SendMessageRequest) -> Self {
        match req {
            SendMessageRequest::Text { text } => MessageBody::text(text),
            SendMessageRequest::Attachment { name, mime, size } => {
                MessageBody::attachment(name, mime, size)
            }
        }
    }
}

/// Query of `GET /v1/orders/{id}/messages`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MessageQuery {
    /// Return messages with `seq` greater than this. Defaults to 0.
    pub after: Option<u64>,
    /// Page size, at most 500. Defaults to the configured page size.
    pub limit: Option<usize>,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/orders/{id}/messages",
        get(list_messages).post(send_message),
    )
}

// ── Handlers ────────────────────────────────────────────────────────

/// GET /v1/orders/{id}/messages — Read the chat after a sequence number.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}/messages",
    params(("id" = Uuid, Path, description = "Order ID"), MessageQuery),
    responses(
        (status = 200, description = "Messages, oldest first", body = MessagePage),
        (status = 403, description = "Not allowed to read this chat", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown order", body = crate::error::ErrorBody),
    ),
    tag = "messages"
)]
pub(crate) async fn list_messages(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> Result<Json<MessagePage>, AppError> {
    let query = extract_query(query)?;
    let after = query.after.unwrap_or(0);
    let limit = query
        .limit
        .unwrap_or(state.engine.config().message_page_size)
        .clamp(1, MAX_PAGE);

    let mut cursor = state
        .engine
        .channel()
        .list(OrderId::from_uuid(id), &caller.actor(), after)?;
    let items: Vec<MessageView> = cursor.by_ref().take(limit).map(|m| MessageView::from(&m)).collect();
    Ok(Json(MessagePage {
        items,
        next_after: cursor.position(),
        has_more: cursor.has_more(),
    }))
}

/// POST /v1/orders/{id}/messages — Post to the chat.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/messages",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message appended", body = MessageView),
        (status = 403, description = "Not allowed to post", body = crate::error::ErrorBody),
        (status = 409, description = "Chat closed", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid message", body = crate::error::ErrorBody),
    ),
    tag = "messages"
)]
pub(crate) async fn send_message(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let req = extract_json(body)?;
    let order_id = OrderId::from_uuid(id);
    let actor = caller.actor();
    let message = on_engine(&state, move |engine| {
        engine.channel().send(order_id, &actor, req.into())
    })
    .await?;
    state.persist_messages(order_id).await;
    Ok((StatusCode::CREATED, Json(MessageView::from(&message))))
}
