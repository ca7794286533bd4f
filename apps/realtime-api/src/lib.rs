pub mod auth;
pub mod config;
pub mod error;
pub mod realtime;
pub mod routes;

use std::sync::Arc;

use auth::SessionAuth;
use config::Config;
use realtime::hub::Hub;
use realtime::notifier::Notifier;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<dyn SessionAuth>,
    pub hub: Arc<Hub>,
    pub notifier: Notifier,
}
