pub mod health;
pub mod notify;
pub mod presence;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::realtime::server::router())
        .nest("/api/v1", presence::router().merge(notify::router()))
}
