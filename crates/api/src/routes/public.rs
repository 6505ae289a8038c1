use axum::routing::{get, post};
use axum::Router;

use crate::handlers::public;
use crate::state::AppState;

/// Unauthenticated routes at the `/api/v1` root.
///
/// ```text
/// POST /subscribe
/// POST /unsubscribe
/// GET  /archive
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscribe", post(public::subscribe))
        .route("/unsubscribe", post(public::unsubscribe))
        .route("/archive", get(public::archive))
}
