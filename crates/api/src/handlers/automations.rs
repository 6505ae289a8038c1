//! Handlers for `/admin/automations`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use newsroom_core::automation::TriggerType;
use newsroom_core::types::DbId;
use newsroom_db::models::automation::{
    Automation, AutomationWithEmails, CreateAutomation, SubscriberAutomation, UpdateAutomation,
};
use newsroom_pipeline::automation::{
    AdvanceSummary, ReengagementRequest, ReengagementResult, WelcomeRequest,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::rbac::{RequireAdmin, RequireAuth};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub subscriber_id: DbId,
    #[serde(default)]
    pub custom_data: Option<serde_json::Value>,
}

/// Request body for `POST /admin/automations/triggers`.
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub trigger_type: TriggerType,
    /// Must carry `subscriber_id`; conditions are matched against it.
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct TriggerResult {
    pub enrolled: u64,
}

/// GET /api/v1/admin/automations
pub async fn list(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Automation>>>> {
    let automations = state.automations.list_automations().await?;
    Ok(Json(DataResponse::new(automations)))
}

/// POST /api/v1/admin/automations
pub async fn create(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateAutomation>,
) -> AppResult<(StatusCode, Json<DataResponse<AutomationWithEmails>>)> {
    let created = state.automations.create_automation(&input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(created))))
}

/// GET /api/v1/admin/automations/{id}
pub async fn get_by_id(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<AutomationWithEmails>>> {
    let automation = state.automations.get_automation(id).await?;
    Ok(Json(DataResponse::new(automation)))
}

/// PUT /api/v1/admin/automations/{id}
pub async fn update(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateAutomation>,
) -> AppResult<Json<DataResponse<AutomationWithEmails>>> {
    let automation = state.automations.update_automation(id, &input).await?;
    Ok(Json(DataResponse::new(automation)))
}

/// DELETE /api/v1/admin/automations/{id}
pub async fn delete(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    state.automations.delete_automation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/automations/{id}/enroll
pub async fn enroll(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<EnrollRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<SubscriberAutomation>>)> {
    let custom_data = input
        .custom_data
        .unwrap_or_else(|| serde_json::json!({}));
    let enrollment = state
        .automations
        .add_subscriber_to_automation(id, input.subscriber_id, custom_data)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(enrollment))))
}

/// POST /api/v1/admin/automations/welcome
pub async fn welcome(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<WelcomeRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<AutomationWithEmails>>)> {
    let created = state.automations.create_welcome_sequence(&input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(created))))
}

/// POST /api/v1/admin/automations/reengagement
pub async fn reengagement(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<ReengagementRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ReengagementResult>>)> {
    let result = state.automations.create_reengagement_campaign(&input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(result))))
}

/// POST /api/v1/admin/automations/process
///
/// Runs one advancer pass now instead of waiting for the worker.
pub async fn process(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<AdvanceSummary>>> {
    let summary = state.automations.process_automation_emails().await?;
    Ok(Json(DataResponse::new(summary)))
}

/// POST /api/v1/admin/automations/triggers
pub async fn trigger(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<TriggerRequest>,
) -> AppResult<Json<DataResponse<TriggerResult>>> {
    let enrolled = state
        .automations
        .handle_trigger_event(input.trigger_type, &input.data)
        .await?;
    Ok(Json(DataResponse::new(TriggerResult { enrolled })))
}
