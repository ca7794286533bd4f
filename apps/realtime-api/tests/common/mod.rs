//! Shared test harness: in-memory `AppState`, a real TCP listener, and
//! session-token minting that mirrors the auth service's HS256 tokens.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header};

use realtime_api::auth::jwt::{JwtSessionAuth, SessionClaims};
use realtime_api::config::Config;
use realtime_api::realtime::hub::Hub;
use realtime_api::realtime::notifier::Notifier;
use realtime_api::AppState;

pub const TEST_SECRET: &str = "realtime-test-secret";

pub fn test_state() -> AppState {
    let config = Config {
        port: 0,
        session_secret: TEST_SECRET.to_string(),
        allowed_origins: vec!["*".to_string()],
    };
    let hub = Hub::start();
    AppState {
        config: Arc::new(config),
        auth: Arc::new(JwtSessionAuth::new(TEST_SECRET)),
        notifier: Notifier::new(hub.clone()),
        hub,
    }
}

/// Start the full router on an ephemeral port. The server runs in the
/// background for the rest of the test.
pub async fn start_server() -> (SocketAddr, AppState) {
    let state = test_state();
    let app = realtime_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Mint a session token the way the auth service would.
pub fn mint_session(user_id: u64, orgs: &[u64]) -> String {
    let claims = SessionClaims {
        sub: user_id,
        orgs: orgs.to_vec(),
        exp: chrono::Utc::now().timestamp() + 600,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint session token")
}

/// Poll until the hub's control loop has caught up with a condition.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
