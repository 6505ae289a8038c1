use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::subscribers;
use crate::state::AppState;

/// Routes mounted at `/admin/subscribers`.
///
/// ```text
/// GET, POST          /
/// POST               /bulk-tag
/// POST               /bulk-delete           (admin)
/// POST               /clean                 (admin)
/// POST               /process-bounces       (admin)
/// GET, PUT, DELETE   /{id}                  (delete: admin)
/// POST               /{id}/tags
/// DELETE             /{id}/tags/{tag}
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(subscribers::list).post(subscribers::create))
        .route("/bulk-tag", post(subscribers::bulk_tag))
        .route("/bulk-delete", post(subscribers::bulk_delete))
        .route("/clean", post(subscribers::clean))
        .route("/process-bounces", post(subscribers::process_bounces))
        .route(
            "/{id}",
            get(subscribers::get_by_id)
                .put(subscribers::update)
                .delete(subscribers::delete),
        )
        .route("/{id}/tags", post(subscribers::add_tag))
        .route("/{id}/tags/{tag}", delete(subscribers::remove_tag))
}
