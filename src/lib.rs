// Library exports for the API binary and tests
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use services::notifications::NotificationService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub notifications: Arc<NotificationService>,
}
