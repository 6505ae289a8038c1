use axum::routing::{get, post};
use axum::Router;

use crate::handlers::newsletters;
use crate::state::AppState;

/// Routes mounted at `/admin/newsletters`.
///
/// ```text
/// GET, POST          /
/// GET, PUT, DELETE   /{id}                      (delete: admin)
/// GET                /{id}/preview              text/html
/// POST               /{id}/send                 202 + send job
/// GET                /{id}/send-jobs
/// GET                /{id}/analytics
/// GET                /{id}/analytics/export     text/csv
/// GET                /{id}/heatmap
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(newsletters::list).post(newsletters::create))
        .route(
            "/{id}",
            get(newsletters::get_by_id)
                .put(newsletters::update)
                .delete(newsletters::delete),
        )
        .route("/{id}/preview", get(newsletters::preview))
        .route("/{id}/send", post(newsletters::send))
        .route("/{id}/send-jobs", get(newsletters::send_jobs))
        .route("/{id}/analytics", get(newsletters::analytics))
        .route("/{id}/analytics/export", get(newsletters::export))
        .route("/{id}/heatmap", get(newsletters::heat_map))
}
