//! Bearer-token extraction for the REST surface.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nimbus_common::{OrgId, UserId};

use crate::AppState;

/// Authenticated caller extracted from the `Authorization: Bearer <token>`
/// header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub org_ids: Vec<OrgId>,
}

/// Rejection returned when the bearer token is missing or invalid.
pub struct AuthRejection {
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthRejection {
                message: "Missing Authorization header",
            })?;

        let token = header.strip_prefix("Bearer ").ok_or(AuthRejection {
            message: "Invalid Authorization header format",
        })?;

        let session = state
            .auth
            .verify(token)
            .await
            .map_err(|message| AuthRejection { message })?;

        Ok(AuthUser {
            user_id: session.user_id,
            org_ids: session.org_ids,
        })
    }
}
