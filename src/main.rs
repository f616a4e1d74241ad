use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hostelmeal_api::config::Config;
use hostelmeal_api::services::notifications::NotificationService;
use hostelmeal_api::services::scheduler::ReconciliationScheduler;
use hostelmeal_api::{db, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let notifications = Arc::new(NotificationService::new(config.fcm_api_key.clone()));

    let state = AppState {
        db: pool.clone(),
        config: config.clone(),
        notifications: notifications.clone(),
    };

    // Background reconciliation: daily next-day auto-booking and hourly
    // cutoff lock sweep.
    ReconciliationScheduler::start(pool, notifications);

    // CORS: the configured base URL, plus localhost for development.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        o == base_url
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        // Bookings
        .route("/bookings/bulk", post(routes::bookings::submit_bulk))
        .route("/bookings/calendar", get(routes::bookings::monthly_calendar))
        // Warden reporting
        .route("/reports/meal-analytics", get(routes::reports::meal_analytics))
        .route("/reports/student-meal-status", get(routes::reports::student_meal_status))
        // Hostel meal policy
        .route(
            "/hostels/{id}/meal-cutoffs",
            get(routes::policy::get_meal_cutoffs).put(routes::policy::set_meal_cutoffs),
        )
        .route(
            "/hostels/{id}/meal-timings",
            get(routes::policy::get_meal_timings).put(routes::policy::set_meal_timings),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("hostelmeal API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
