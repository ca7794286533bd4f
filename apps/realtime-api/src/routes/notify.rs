//! Internal producer endpoint: lets sibling services enqueue a notification
//! without linking against the hub directly.
//!
//! Delivery is best-effort; a 200 means "queued", never "delivered".

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use nimbus_common::events::NotificationPayload;
use nimbus_common::UserId;
use serde::Deserialize;

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/notify", post(send_notification))
}

#[derive(Debug, Deserialize)]
struct NotifyRequest {
    /// Omitted means "broadcast to all connected users".
    user_id: Option<UserId>,
    title: String,
    body: Option<String>,
    link: Option<String>,
}

async fn send_notification(
    State(state): State<AppState>,
    _caller: AuthUser,
    Json(req): Json<NotifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }

    let mut payload = NotificationPayload::new(req.title);
    if let Some(body) = req.body {
        payload = payload.with_body(body);
    }
    if let Some(link) = req.link {
        payload = payload.with_link(link);
    }

    match req.user_id {
        Some(user_id) => state.notifier.notify_user(user_id, payload).await,
        None => state.notifier.notify_all(payload).await,
    }

    Ok(Json(serde_json::json!({ "queued": true })))
}
