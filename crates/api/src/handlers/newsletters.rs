//! Handlers for `/admin/newsletters`: CRUD, preview, sending and reports.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{Datelike, Utc};
use newsroom_core::analytics::NewsletterMetrics;
use newsroom_core::error::CoreError;
use newsroom_core::newsletter::{initial_status, NewsletterContent, CLAIMABLE_STATUSES};
use newsroom_core::types::DbId;
use newsroom_db::models::newsletter::{
    CreateNewsletter, Newsletter, NewsletterListParams, UpdateNewsletter,
};
use newsroom_db::models::send_job::SendJob;
use newsroom_db::models::tracking::UrlClicks;
use newsroom_db::repositories::{NewsletterRepo, SendJobRepo};
use newsroom_pipeline::BatchOptions;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{RequireAdmin, RequireAuth};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `POST /admin/newsletters/{id}/send`.
#[derive(Debug, Default, Deserialize)]
pub struct SendParams {
    pub batch_size: Option<usize>,
    pub delay_secs: Option<u64>,
}

impl SendParams {
    fn options(&self) -> AppResult<BatchOptions> {
        if self.batch_size == Some(0) {
            return Err(AppError::BadRequest("batch_size must be positive".into()));
        }
        Ok(BatchOptions {
            batch_size: self.batch_size,
            delay: self.delay_secs.map(Duration::from_secs),
        })
    }
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Newsletter",
        id,
    })
}

async fn find(state: &AppState, id: DbId) -> AppResult<Newsletter> {
    NewsletterRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/newsletters?limit=
pub async fn list(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<NewsletterListParams>,
) -> AppResult<Json<DataResponse<Vec<Newsletter>>>> {
    let newsletters = NewsletterRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse::new(newsletters)))
}

/// POST /api/v1/admin/newsletters
///
/// Starts as `scheduled` when `scheduled_at` is given, else `draft`.
pub async fn create(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateNewsletter>,
) -> AppResult<(StatusCode, Json<DataResponse<Newsletter>>)> {
    input.content_view().validate()?;

    let status = initial_status(input.scheduled_at);
    let newsletter = NewsletterRepo::create(&state.pool, &input, status, Some(user.user_id)).await?;

    tracing::info!(
        newsletter_id = newsletter.id,
        status = %newsletter.status,
        user_id = user.user_id,
        "Newsletter created",
    );
    Ok((StatusCode::CREATED, Json(DataResponse::new(newsletter))))
}

/// GET /api/v1/admin/newsletters/{id}
pub async fn get_by_id(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Newsletter>>> {
    Ok(Json(DataResponse::new(find(&state, id).await?)))
}

/// PUT /api/v1/admin/newsletters/{id}
///
/// The merged result must still be a valid newsletter. Newsletters that are
/// sending or sent are read-only.
pub async fn update(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateNewsletter>,
) -> AppResult<Json<DataResponse<Newsletter>>> {
    let current = find(&state, id).await?;
    if !CLAIMABLE_STATUSES.contains(&current.status.as_str()) {
        return Err(AppError::Core(CoreError::Conflict(
            "Newsletter has already been sent or is being sent".into(),
        )));
    }

    let merged = NewsletterContent {
        title: input.title.as_deref().unwrap_or(&current.title),
        subject: input.subject.as_deref().unwrap_or(&current.subject),
        content: input.content.as_deref().unwrap_or(&current.content),
        use_template: input.use_template.unwrap_or(current.use_template),
        template: input.template.as_deref().unwrap_or(&current.template),
        template_data: input.template_data.as_ref().unwrap_or(&current.template_data),
    };
    merged.validate()?;

    let newsletter = NewsletterRepo::update(&state.pool, id, &input)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse::new(newsletter)))
}

/// DELETE /api/v1/admin/newsletters/{id}
pub async fn delete(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !NewsletterRepo::delete(&state.pool, id).await? {
        return Err(not_found(id));
    }
    tracing::info!(newsletter_id = id, user_id = user.user_id, "Newsletter deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/newsletters/{id}/preview
pub async fn preview(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Html<String>> {
    let newsletter = find(&state, id).await?;
    let html = newsletter.content_view().render(Utc::now().year())?;
    Ok(Html(html))
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/newsletters/{id}/send?batch_size=&delay_secs=
///
/// Claims the newsletter and answers 202 with the send job; the batches go
/// out in the background. A second send of the same newsletter is a 409.
pub async fn send(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<SendParams>,
) -> AppResult<(StatusCode, Json<DataResponse<SendJob>>)> {
    let batch = state
        .sender
        .start_newsletter_send(id, params.options()?)
        .await?;
    let job = batch.job.clone();

    tracing::info!(
        newsletter_id = id,
        send_job_id = job.id,
        user_id = user.user_id,
        "Newsletter send started",
    );

    state.sender.spawn_batch(batch);

    Ok((StatusCode::ACCEPTED, Json(DataResponse::new(job))))
}

/// GET /api/v1/admin/newsletters/{id}/send-jobs
pub async fn send_jobs(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<SendJob>>>> {
    find(&state, id).await?;
    let jobs = SendJobRepo::list_for_newsletter(&state.pool, id).await?;
    Ok(Json(DataResponse::new(jobs)))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/newsletters/{id}/analytics
pub async fn analytics(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<NewsletterMetrics>>> {
    let metrics = state.analytics.newsletter_analytics(id).await?;
    Ok(Json(DataResponse::new(metrics)))
}

/// GET /api/v1/admin/newsletters/{id}/analytics/export
pub async fn export(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Response> {
    let csv = state.analytics.export_csv(id).await?;
    let disposition = format!("attachment; filename=\"newsletter-{id}-analytics.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

/// GET /api/v1/admin/newsletters/{id}/heatmap
pub async fn heat_map(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<UrlClicks>>>> {
    let clicks = state.analytics.heat_map(id).await?;
    Ok(Json(DataResponse::new(clicks)))
}
