use axum::extract::{Path, State};
use axum::Json;
use newsroom_core::error::CoreError;
use newsroom_core::types::DbId;
use newsroom_db::models::send_job::SendJob;
use newsroom_db::repositories::SendJobRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/admin/send-jobs/{id}
///
/// Progress of a batch send: current batch, sent and failed counts.
pub async fn get_by_id(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<SendJob>>> {
    let job = SendJobRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "SendJob",
            id,
        }))?;
    Ok(Json(DataResponse::new(job)))
}
