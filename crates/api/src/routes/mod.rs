pub mod auth;
pub mod automations;
pub mod health;
pub mod newsletters;
pub mod public;
pub mod subscribers;
pub mod tracking;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /subscribe, /unsubscribe, /archive             public
/// /auth/login, /auth/refresh, /auth/logout
///
/// /admin/dashboard                               GET
/// /admin/subscribers/...                         see routes::subscribers
/// /admin/newsletters/...                         see routes::newsletters
/// /admin/send-jobs/{id}                          GET
/// /admin/analytics/subscribers                   GET
/// /admin/analytics/send-time                     POST
/// /admin/automations/...                         see routes::automations
/// ```
///
/// Every `/admin` handler checks the caller's token through its extractor.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(public::router())
        .nest("/auth", auth::router())
        .nest("/admin", admin_routes())
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handlers::dashboard::get))
        .nest("/subscribers", subscribers::router())
        .nest("/newsletters", newsletters::router())
        .route("/send-jobs/{id}", get(handlers::send_jobs::get_by_id))
        .route(
            "/analytics/subscribers",
            get(handlers::analytics::subscribers),
        )
        .route("/analytics/send-time", post(handlers::analytics::send_time))
        .nest("/automations", automations::router())
}
