use axum::routing::{get, post};
use axum::Router;

use crate::handlers::automations;
use crate::state::AppState;

/// Routes mounted at `/admin/automations`.
///
/// ```text
/// GET, POST          /
/// POST               /welcome
/// POST               /reengagement
/// POST               /process
/// POST               /triggers
/// GET, PUT, DELETE   /{id}          (delete: admin)
/// POST               /{id}/enroll
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(automations::list).post(automations::create))
        .route("/welcome", post(automations::welcome))
        .route("/reengagement", post(automations::reengagement))
        .route("/process", post(automations::process))
        .route("/triggers", post(automations::trigger))
        .route(
            "/{id}",
            get(automations::get_by_id)
                .put(automations::update)
                .delete(automations::delete),
        )
        .route("/{id}/enroll", post(automations::enroll))
}
