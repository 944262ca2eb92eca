//! REST API handlers for notification submission, inspection, and
//! operational endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use notify_core::error::NotifyError;
use notify_core::store::NotificationStore;
use notify_core::types::{Notification, NotificationId, NotificationState, NotificationStats};
use notify_lifecycle::{ApproveOutcome, NewNotification, Submitter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Number of notifications returned by the list endpoint.
const LIST_LIMIT: usize = 50;

/// Maximum recipient length accepted at the API boundary.
const MAX_RECIPIENT_LEN: usize = 512;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub submitter: Arc<Submitter>,
    pub node_id: String,
    pub start_time: Instant,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

fn map_error(e: NotifyError) -> ApiError {
    match e {
        NotifyError::Validation(msg) => {
            metrics::counter!("api.validation_errors").increment(1);
            api_error(StatusCode::BAD_REQUEST, "invalid_notification", msg)
        }
        NotifyError::NotFound(id) => api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Notification {id} not found"),
        ),
        other => {
            error!(error = %other, "Request failed");
            metrics::counter!("api.errors").increment(1);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal processing error",
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    #[serde(flatten)]
    pub notification: NewNotification,
    /// Keep the notification in `draft` instead of approving it.
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: NotificationId,
    pub state: NotificationState,
}

/// POST /api/notifications — create a notification, approved and queued
/// unless `draft` is set.
pub async fn create_notification(
    State(state): State<AppState>,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    if request.notification.recipient.len() > MAX_RECIPIENT_LEN {
        warn!("Recipient exceeds maximum length");
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_notification",
            "recipient exceeds maximum length",
        ));
    }

    let created = state
        .submitter
        .submit(request.notification, !request.draft)
        .await
        .map_err(map_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id: created.id,
            state: created.state,
        }),
    ))
}

/// GET /api/notifications — most recent notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let recent = state.store.recent(LIST_LIMIT).await.map_err(map_error)?;
    Ok(Json(recent))
}

/// GET /api/notifications/stats
pub async fn notification_stats(
    State(state): State<AppState>,
) -> Result<Json<NotificationStats>, ApiError> {
    let stats = state.store.stats().await.map_err(map_error)?;
    Ok(Json(stats))
}

/// GET /api/notifications/:id
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>, ApiError> {
    match state.store.find_by_id(id).await.map_err(map_error)? {
        Some(n) => Ok(Json(n)),
        None => Err(map_error(NotifyError::NotFound(id))),
    }
}

/// POST /api/notifications/:id/approve
pub async fn approve_notification(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>, ApiError> {
    match state.submitter.approve(id).await.map_err(map_error)? {
        ApproveOutcome::Approved(n) => Ok(Json(n)),
        ApproveOutcome::NotPermitted(current) => Err(api_error(
            StatusCode::CONFLICT,
            "transition_not_permitted",
            format!("Cannot approve a notification in state {current}"),
        )),
    }
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — 200 only while the store answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store.stats().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live — Liveness check.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
