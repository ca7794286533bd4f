//! Online-presence queries for sibling services and admin tooling.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use nimbus_common::{OrgId, UserId};
use serde::Serialize;

use crate::auth::middleware::AuthUser;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/presence", get(presence_summary))
        .route("/presence/{user_id}", get(user_presence))
}

#[derive(Debug, Serialize)]
struct PresenceSummary {
    connected: usize,
    users: Vec<UserId>,
    orgs: Vec<OrgId>,
}

async fn presence_summary(State(state): State<AppState>, _caller: AuthUser) -> Json<PresenceSummary> {
    Json(PresenceSummary {
        connected: state.hub.connected_count(),
        users: state.hub.connected_users(),
        orgs: state.hub.connected_org_ids(),
    })
}

#[derive(Debug, Serialize)]
struct UserPresence {
    user_id: UserId,
    online: bool,
}

async fn user_presence(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(user_id): Path<UserId>,
) -> Json<UserPresence> {
    Json(UserPresence {
        user_id,
        online: state.hub.is_online(user_id),
    })
}
