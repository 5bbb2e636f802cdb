use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use classbook_shared::Notification;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationFeed {
    pub unread: usize,
    pub notifications: Vec<Notification>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users/{user_id}/notifications", get(list_notifications))
        .route("/v1/users/{user_id}/notifications/read", post(mark_all_read))
        .route("/v1/notifications/{id}/read", post(mark_read))
        .route("/v1/notifications/{id}", delete(delete_notification))
}

/// GET /v1/users/{user_id}/notifications
async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<NotificationFeed> {
    let center = state.orchestrator.notifications();
    Json(NotificationFeed {
        unread: center.unread_count(&user_id),
        notifications: center.for_user(&user_id),
    })
}

/// POST /v1/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.orchestrator.notifications().mark_read(&notification_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFoundError(format!("Notification not found: {}", notification_id)))
    }
}

/// POST /v1/users/{user_id}/notifications/read
async fn mark_all_read(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    let updated = state.orchestrator.notifications().mark_all_read(&user_id);
    Json(json!({ "updated": updated }))
}

/// DELETE /v1/notifications/{id}
async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.orchestrator.notifications().delete(&notification_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFoundError(format!("Notification not found: {}", notification_id)))
    }
}
