//! Unauthenticated endpoints: subscribe, unsubscribe and the archive.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use newsroom_core::subscriber::validate_email;
use newsroom_db::models::newsletter::ArchivedNewsletter;
use newsroom_db::models::subscriber::{CreateSubscriber, Subscriber};
use newsroom_db::repositories::{NewsletterRepo, SubscriberRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::subscribers::add_subscriber;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_ARCHIVE_LIMIT: i64 = 20;
const MAX_ARCHIVE_LIMIT: i64 = 100;

/// Request body for `POST /subscribe`.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub name: Option<String>,
    pub group: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body for `POST /unsubscribe`.
#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveParams {
    pub limit: Option<i64>,
}

/// POST /api/v1/subscribe
///
/// 409 when the email is already subscribed. The confirmation email, when
/// enabled, is sent in the background and its failure only logged.
pub async fn subscribe(
    State(state): State<AppState>,
    Json(input): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Subscriber>>)> {
    let create = CreateSubscriber {
        email: input.email,
        name: input.name,
        group_name: input.group,
        tags: input.tags,
        custom_fields: None,
    };
    let subscriber = add_subscriber(&state, create, None).await?;

    if state.sender.config().send_subscription_confirmation {
        let sender = state.sender.clone();
        let recipient = subscriber.clone();
        tokio::spawn(async move {
            if let Err(e) = sender.send_subscription_confirmation(&recipient).await {
                tracing::warn!(
                    subscriber_id = recipient.id,
                    error = %e,
                    "Subscription confirmation not sent",
                );
            }
        });
    }

    Ok((StatusCode::CREATED, Json(DataResponse::new(subscriber))))
}

/// POST /api/v1/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(input): Json<UnsubscribeRequest>,
) -> AppResult<Json<DataResponse<Subscriber>>> {
    let email = validate_email(&input.email)?;
    let subscriber = SubscriberRepo::unsubscribe(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscriber not found".into()))?;

    tracing::info!(subscriber_id = subscriber.id, "Subscriber unsubscribed");
    Ok(Json(DataResponse::new(subscriber)))
}

/// GET /api/v1/archive?limit=
pub async fn archive(
    State(state): State<AppState>,
    Query(params): Query<ArchiveParams>,
) -> AppResult<Json<DataResponse<Vec<ArchivedNewsletter>>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_ARCHIVE_LIMIT)
        .clamp(1, MAX_ARCHIVE_LIMIT);
    let newsletters = NewsletterRepo::list_archive(&state.pool, limit).await?;
    Ok(Json(DataResponse::new(newsletters)))
}
