//! WebSocket upgrade handler: origin check, session authentication, then the
//! per-connection pumps.

use std::collections::HashMap;

use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;

use crate::auth::Session;
use crate::error::ApiError;
use crate::AppState;

use super::connection::{self, Connection, MAX_FRAME_BYTES};

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "nimbus_session";

pub fn router() -> Router<AppState> {
    Router::new().route("/realtime", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // Origin check first; cheap and config-driven.
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        if !state.config.origin_allowed(origin) {
            tracing::debug!(origin, "ws upgrade from disallowed origin");
            return ApiError::forbidden("Origin not allowed").into_response();
        }
    }

    // Authentication happens before any hub interaction.
    let Some(token) = extract_token(&headers, &params) else {
        return ApiError::unauthorized("Missing session token").into_response();
    };
    let session = match state.auth.verify(&token).await {
        Ok(session) => session,
        Err(reason) => {
            tracing::debug!(%reason, "ws upgrade rejected");
            return ApiError::unauthorized(reason).into_response();
        }
    };

    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_connection(socket, state, session))
}

/// Session token lookup order: cookie, then `Authorization: Bearer`, then the
/// `token` query parameter (only for clients that cannot set headers).
fn extract_token(headers: &HeaderMap, params: &HashMap<String, String>) -> Option<String> {
    if let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some(value) = pair.trim().strip_prefix(SESSION_COOKIE) {
                if let Some(token) = value.strip_prefix('=') {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    params.get("token").filter(|t| !t.is_empty()).cloned()
}

async fn handle_connection(socket: WebSocket, state: AppState, session: Session) {
    let (conn, outbound_rx) = Connection::new(
        session.user_id,
        session.org_ids.into_iter().collect(),
    );

    state.hub.register(conn.clone()).await;
    tracing::info!(user_id = conn.user_id(), "realtime connection established");

    let (ws_tx, ws_rx) = socket.split();
    let writer = tokio::spawn(connection::write_pump(conn.clone(), outbound_rx, ws_tx));
    connection::read_pump(conn.clone(), state.hub.clone(), ws_rx).await;
    let _ = writer.await;

    tracing::info!(user_id = conn.user_id(), "realtime connection closed");
}
