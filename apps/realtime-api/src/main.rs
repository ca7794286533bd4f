use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_api::auth::jwt::JwtSessionAuth;
use realtime_api::auth::SessionAuth;
use realtime_api::config::Config;
use realtime_api::realtime::hub::Hub;
use realtime_api::realtime::notifier::Notifier;
use realtime_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let hub = Hub::start();
    let auth: Arc<dyn SessionAuth> = Arc::new(JwtSessionAuth::new(&config.session_secret));

    let state = AppState {
        config: Arc::new(config),
        auth,
        notifier: Notifier::new(hub.clone()),
        hub,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(realtime_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "realtime-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.hub.clone()))
        .await
        .expect("server error");
}

async fn shutdown_signal(hub: Arc<Hub>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    hub.stop();
}
