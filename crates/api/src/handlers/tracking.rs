//! Open pixel and click redirect endpoints embedded in sent emails.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use newsroom_pipeline::PipelineError;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// A transparent 1×1 GIF.
pub static PIXEL_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// GET /api/track/open/{tracking_id}
///
/// Always answers with the pixel; mail clients must never see an error.
pub async fn open(State(state): State<AppState>, Path(tracking_id): Path<String>) -> Response {
    match Uuid::parse_str(&tracking_id) {
        Ok(id) => match state.analytics.record_open(id).await {
            Ok(()) => {}
            Err(PipelineError::TrackingNotFound) => {
                tracing::debug!(tracking_id = %id, "Open for unknown tracking id");
            }
            Err(e) => {
                tracing::warn!(tracking_id = %id, error = %e, "Failed to record open");
            }
        },
        Err(_) => tracing::debug!(tracking_id = %tracking_id, "Malformed open tracking id"),
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        &PIXEL_GIF[..],
    )
        .into_response()
}

/// GET /api/track/click/{tracking_id}
///
/// 302 to the original link. Unknown or malformed ids are a 404.
pub async fn click(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> AppResult<Response> {
    let id = Uuid::parse_str(&tracking_id)
        .map_err(|_| AppError::NotFound(PipelineError::TrackingNotFound.to_string()))?;
    let url = state.analytics.record_click(id).await?;

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, url),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response())
}
