use axum::routing::get;
use axum::Router;

use crate::handlers::tracking;
use crate::state::AppState;

/// Routes mounted at `/api/track`, outside `/api/v1` so links in already
/// sent emails keep working across API versions.
///
/// ```text
/// GET /open/{tracking_id}   -> 1x1 GIF
/// GET /click/{tracking_id}  -> 302 to the original URL
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/open/{tracking_id}", get(tracking::open))
        .route("/click/{tracking_id}", get(tracking::click))
}
