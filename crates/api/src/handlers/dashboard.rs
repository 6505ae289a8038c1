use axum::extract::State;
use axum::Json;
use newsroom_pipeline::analytics::Dashboard;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/admin/dashboard
pub async fn get(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Dashboard>>> {
    let dashboard = state.analytics.dashboard().await?;
    Ok(Json(DataResponse::new(dashboard)))
}
