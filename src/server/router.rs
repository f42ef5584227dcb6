//! Route table for the web service
//!
//! - `/health`, `/healthz`
//! - sign-in: `/login`, `/verify_phone_token`, `/verify_google_token`, `/logout`
//! - scheduler: `/cron/{bse_announcements,hourly_spike_alerts,evening_summary}`
//! - dashboard and watchlist forms under `/`
//! - sentiment: `/sentiment_analysis`, `/analyze_sentiment`, `/get_sentiment_summary`
//! - admin panel under `/admin/`
//! - `/debug/*` and `/test/*` when debug endpoints are enabled

use crate::server::handlers::{admin, auth, cron, dashboard, debug, health, sentiment};
use crate::server::host::AppState;
use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Build the application router; `custom_routes` are merged as-is
pub fn build_router(host: AppState, custom_routes: Vec<Router>) -> Router {
    let mut routes = health_routes()
        .merge(auth_routes())
        .merge(cron_routes())
        .merge(dashboard_routes())
        .merge(sentiment_routes())
        .merge(admin_routes());

    if host.config.debug_endpoints {
        tracing::warn!("debug endpoints enabled");
        routes = routes.merge(debug_routes());
    }

    let mut app = routes.fallback(not_found).with_state(host);
    for custom_router in custom_routes {
        app = app.merge(custom_router);
    }

    app.layer(TraceLayer::new_for_http())
}

fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/healthz", get(health::health))
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page))
        .route("/verify_phone_token", post(auth::verify_phone_token))
        .route("/verify_google_token", post(auth::verify_google_token))
        .route("/logout", get(auth::logout))
}

fn cron_routes() -> Router<AppState> {
    Router::new()
        .route("/cron/bse_announcements", get(cron::bse_announcements))
        .route("/cron/hourly_spike_alerts", get(cron::hourly_spike_alerts))
        .route("/cron/evening_summary", get(cron::evening_summary))
}

fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::dashboard))
        .route("/search", get(dashboard::search))
        .route("/send_script_messages", post(dashboard::send_script_messages))
        .route("/send_bse_announcements", post(dashboard::send_bse_announcements))
        .route("/add_scrip", post(dashboard::add_scrip))
        .route("/delete_scrip", post(dashboard::delete_scrip))
        .route("/add_recipient", post(dashboard::add_recipient))
        .route("/delete_recipient", post(dashboard::delete_recipient))
        .route("/set_category_prefs", post(dashboard::set_category_prefs))
}

fn sentiment_routes() -> Router<AppState> {
    Router::new()
        .route("/sentiment_analysis", get(sentiment::sentiment_page))
        .route("/analyze_sentiment", post(sentiment::analyze_sentiment))
        .route("/get_sentiment_summary", get(sentiment::sentiment_summary))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(admin::dashboard))
        .route("/admin/", get(admin::dashboard))
        .route("/admin/cron_runs", get(admin::cron_runs))
        .route("/admin/user/{user_id}", get(admin::view_user))
        .route("/admin/add_scrip", post(admin::add_scrip))
        .route("/admin/delete_scrip", post(admin::delete_scrip))
        .route("/admin/add_recipient", post(admin::add_recipient))
        .route("/admin/delete_recipient", post(admin::delete_recipient))
        .route("/admin/purge", post(admin::purge))
}

fn debug_routes() -> Router<AppState> {
    Router::new()
        .route("/debug/cron_auth", get(debug::cron_auth))
        .route("/debug/user_setup", get(debug::user_setup))
        .route("/debug/cron_logs", get(debug::cron_logs))
        .route("/test/evening_summary", get(debug::evening_summary))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "message": "The requested URL was not found on the server."
        })),
    )
}
