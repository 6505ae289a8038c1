//! Handlers for `/admin/analytics`.

use axum::extract::State;
use axum::Json;
use newsroom_core::send_time::OptimalSendTime;
use newsroom_core::types::DbId;
use newsroom_db::repositories::SubscriberRepo;
use newsroom_pipeline::analytics::SubscriberAnalytics;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /admin/analytics/send-time`.
#[derive(Debug, Default, Deserialize)]
pub struct SendTimeRequest {
    /// Subscribers to analyse; empty means every active subscriber.
    #[serde(default)]
    pub subscriber_ids: Vec<DbId>,
}

/// GET /api/v1/admin/analytics/subscribers
pub async fn subscribers(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<SubscriberAnalytics>>> {
    let report = state.analytics.subscriber_analytics().await?;
    Ok(Json(DataResponse::new(report)))
}

/// POST /api/v1/admin/analytics/send-time
pub async fn send_time(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<SendTimeRequest>,
) -> AppResult<Json<DataResponse<OptimalSendTime>>> {
    let ids = if input.subscriber_ids.is_empty() {
        SubscriberRepo::active_ids(&state.pool).await?
    } else {
        input.subscriber_ids
    };
    let recommendation = state.analytics.optimal_send_time(&ids).await?;
    Ok(Json(DataResponse::new(recommendation)))
}
