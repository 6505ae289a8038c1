//! Handlers for `/admin/subscribers`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use newsroom_core::error::CoreError;
use newsroom_core::status::is_valid_subscriber_status;
use newsroom_core::subscriber::{normalize_tag, normalize_tags, validate_email};
use newsroom_core::types::DbId;
use newsroom_db::models::subscriber::{
    BulkDeleteRequest, BulkResult, BulkTagRequest, CreateSubscriber, Subscriber,
    SubscriberListParams, UpdateSubscriber,
};
use newsroom_db::repositories::SubscriberRepo;
use newsroom_events::bus::{SUBSCRIBER_CREATED, SUBSCRIBER_TAG_ADDED};
use newsroom_events::PlatformEvent;
use newsroom_pipeline::hygiene::{self, BounceSummary, CleanupSummary};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{RequireAdmin, RequireAuth};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /admin/subscribers/{id}/tags`.
#[derive(Debug, Deserialize)]
pub struct AddTagRequest {
    pub tag: String,
}

// ---------------------------------------------------------------------------
// Shared with the public subscribe endpoint
// ---------------------------------------------------------------------------

/// Validate and insert a subscriber, then announce it on the event bus.
///
/// An existing email is a conflict; the unique index decides, so concurrent
/// requests for one address create exactly one row.
pub(crate) async fn add_subscriber(
    state: &AppState,
    mut input: CreateSubscriber,
    actor: Option<DbId>,
) -> AppResult<Subscriber> {
    input.email = validate_email(&input.email)?;
    input.tags = normalize_tags(&input.tags)?;
    input.name = input
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    input.group_name = input
        .group_name
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty());

    let subscriber = SubscriberRepo::create(&state.pool, &input)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Conflict("Email already subscribed".into())))?;

    tracing::info!(subscriber_id = subscriber.id, "Subscriber added");

    let mut event = PlatformEvent::new(SUBSCRIBER_CREATED)
        .with_subscriber(subscriber.id)
        .with_payload(serde_json::json!({
            "subscriber_id": subscriber.id,
            "email": subscriber.email,
            "group": subscriber.group_name,
            "tags": subscriber.tags,
        }));
    if let Some(user_id) = actor {
        event = event.with_actor(user_id);
    }
    state.event_bus.publish(event);

    Ok(subscriber)
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Subscriber",
        id,
    })
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/subscribers?status=&tag=&limit=&offset=
pub async fn list(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Query(mut params): Query<SubscriberListParams>,
) -> AppResult<Json<DataResponse<Vec<Subscriber>>>> {
    if let Some(status) = params.status.as_deref() {
        if !is_valid_subscriber_status(status) {
            return Err(AppError::BadRequest(format!("Unknown status '{status}'")));
        }
    }
    params.tag = params.tag.as_deref().map(normalize_tag).transpose()?;

    let subscribers = SubscriberRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse::new(subscribers)))
}

/// POST /api/v1/admin/subscribers
pub async fn create(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateSubscriber>,
) -> AppResult<(StatusCode, Json<DataResponse<Subscriber>>)> {
    let subscriber = add_subscriber(&state, input, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(subscriber))))
}

/// GET /api/v1/admin/subscribers/{id}
pub async fn get_by_id(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Subscriber>>> {
    let subscriber = SubscriberRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse::new(subscriber)))
}

/// PUT /api/v1/admin/subscribers/{id}
pub async fn update(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(mut input): Json<UpdateSubscriber>,
) -> AppResult<Json<DataResponse<Subscriber>>> {
    if let Some(status) = input.status.as_deref() {
        if !is_valid_subscriber_status(status) {
            return Err(AppError::BadRequest(format!("Unknown status '{status}'")));
        }
    }
    if let Some(tags) = &input.tags {
        input.tags = Some(normalize_tags(tags)?);
    }

    let subscriber = SubscriberRepo::update(&state.pool, id, &input)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse::new(subscriber)))
}

/// DELETE /api/v1/admin/subscribers/{id}
pub async fn delete(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !SubscriberRepo::delete(&state.pool, id).await? {
        return Err(not_found(id));
    }
    tracing::info!(subscriber_id = id, user_id = user.user_id, "Subscriber deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/subscribers/{id}/tags
///
/// Idempotent: adding a tag the subscriber already has changes nothing and
/// publishes no event.
pub async fn add_tag(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AddTagRequest>,
) -> AppResult<Json<DataResponse<Subscriber>>> {
    let tag = normalize_tag(&input.tag)?;

    if SubscriberRepo::add_tag(&state.pool, id, &tag).await? {
        publish_tag_added(&state, id, &tag, user.user_id);
    }

    let subscriber = SubscriberRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse::new(subscriber)))
}

/// DELETE /api/v1/admin/subscribers/{id}/tags/{tag}
pub async fn remove_tag(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path((id, tag)): Path<(DbId, String)>,
) -> AppResult<Json<DataResponse<Subscriber>>> {
    let tag = normalize_tag(&tag)?;
    let subscriber = SubscriberRepo::remove_tag(&state.pool, id, &tag)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse::new(subscriber)))
}

fn publish_tag_added(state: &AppState, subscriber_id: DbId, tag: &str, actor: DbId) {
    state.event_bus.publish(
        PlatformEvent::new(SUBSCRIBER_TAG_ADDED)
            .with_subscriber(subscriber_id)
            .with_actor(actor)
            .with_payload(serde_json::json!({
                "subscriber_id": subscriber_id,
                "tag": tag,
            })),
    );
}

// ---------------------------------------------------------------------------
// Bulk operations
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/subscribers/bulk-tag
///
/// Subscribers that already carry the tag count as succeeded; unknown ids
/// count as failed.
pub async fn bulk_tag(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(input): Json<BulkTagRequest>,
) -> AppResult<Json<DataResponse<BulkResult>>> {
    let tag = normalize_tag(&input.tag)?;
    let mut ids = input.subscriber_ids;
    ids.sort_unstable();
    ids.dedup();

    let existing = SubscriberRepo::existing_ids(&state.pool, &ids).await?;
    let tagged = SubscriberRepo::add_tag_many(&state.pool, &existing, &tag).await?;
    for subscriber_id in &tagged {
        publish_tag_added(&state, *subscriber_id, &tag, user.user_id);
    }

    let result = BulkResult {
        succeeded: existing.len() as i64,
        failed: (ids.len() - existing.len()) as i64,
    };
    tracing::info!(tag = %tag, succeeded = result.succeeded, failed = result.failed, "Bulk tag");
    Ok(Json(DataResponse::new(result)))
}

/// POST /api/v1/admin/subscribers/bulk-delete
pub async fn bulk_delete(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<BulkDeleteRequest>,
) -> AppResult<Json<DataResponse<BulkResult>>> {
    let mut ids = input.subscriber_ids;
    ids.sort_unstable();
    ids.dedup();

    let deleted = SubscriberRepo::delete_many(&state.pool, &ids).await?;
    let result = BulkResult {
        succeeded: deleted as i64,
        failed: ids.len() as i64 - deleted as i64,
    };
    tracing::info!(
        user_id = user.user_id,
        succeeded = result.succeeded,
        failed = result.failed,
        "Bulk delete",
    );
    Ok(Json(DataResponse::new(result)))
}

// ---------------------------------------------------------------------------
// Hygiene
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/subscribers/clean
pub async fn clean(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CleanupSummary>>> {
    let summary = hygiene::clean_subscriber_list(&state.pool).await?;
    Ok(Json(DataResponse::new(summary)))
}

/// POST /api/v1/admin/subscribers/process-bounces
pub async fn process_bounces(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<BounceSummary>>> {
    let summary = hygiene::process_bounces(&state.pool).await?;
    Ok(Json(DataResponse::new(summary)))
}
