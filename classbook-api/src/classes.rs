use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use classbook_booking::BulkCancellationReport;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/classes/refresh", post(refresh_classes))
        .route("/v1/classes/{class_id}/cancel", post(cancel_class))
        .route("/v1/classes/{class_id}", delete(delete_class))
}

/// POST /v1/classes/{class_id}/cancel
/// Per-booking problems and a failed backend call are in the report, not the status code
async fn cancel_class(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
) -> Result<Json<BulkCancellationReport>, AppError> {
    Ok(Json(state.orchestrator.cancel_class(class_id).await?))
}

/// DELETE /v1/classes/{class_id}
async fn delete_class(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
) -> Result<Json<BulkCancellationReport>, AppError> {
    Ok(Json(state.orchestrator.delete_class(class_id).await?))
}

/// POST /v1/classes/refresh
async fn refresh_classes(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let classes = state.orchestrator.refresh_catalog().await?;
    Ok(Json(json!({ "classes": classes })))
}
