use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use classbook_booking::{
    BookingError, BookingRequest, CancellationOutcome, RefundDecision, RefundEntry,
};
use classbook_shared::{BookingStatus, CancellationInitiator, EnhancedBooking};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::presentation::{presentation_for, StatusPresentation};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    #[serde(flatten)]
    pub booking: EnhancedBooking,
    pub presentation: StatusPresentation,
}

impl From<EnhancedBooking> for BookingResponse {
    fn from(booking: EnhancedBooking) -> Self {
        let presentation = presentation_for(booking.status());
        Self {
            booking,
            presentation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefundSummary {
    pub total_refunded: Decimal,
    pub pending: Vec<RefundEntry>,
}

#[derive(Debug, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub initiated_by: CancellationInitiator,
}

#[derive(Debug, Deserialize)]
pub struct CompleteBookingRequest {
    #[serde(default)]
    pub attended: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(list_bookings).post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/{id}/complete", post(complete_booking))
        .route("/v1/bookings/{id}/cancellation-preview", get(preview_cancellation))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/refund/retry", post(retry_refund))
        .route("/v1/users/{user_id}/bookings", get(list_user_bookings))
        .route("/v1/refunds/pending", get(list_pending_refunds))
}

// ============================================================================
// Handlers
// ============================================================================

fn respond(bookings: Vec<EnhancedBooking>) -> Json<Vec<BookingResponse>> {
    Json(bookings.into_iter().map(BookingResponse::from).collect())
}

/// GET /v1/bookings?status=UPCOMING
async fn list_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> Json<Vec<BookingResponse>> {
    let store = state.orchestrator.store();
    match filter.status {
        Some(status) => respond(store.filtered_by_status(status)),
        None => respond(store.snapshot()),
    }
}

/// GET /v1/users/{user_id}/bookings
async fn list_user_bookings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Vec<BookingResponse>> {
    respond(state.orchestrator.store().all_for_user(&user_id))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .orchestrator
        .store()
        .get(&booking_id)
        .ok_or(BookingError::NotFound(booking_id))?;
    Ok(Json(booking.into()))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking = state.orchestrator.book_class(req).await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// POST /v1/bookings/{id}/confirm
async fn confirm_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.orchestrator.confirm_booking(booking_id).await?;
    Ok(Json(booking.into()))
}

/// POST /v1/bookings/{id}/complete
async fn complete_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CompleteBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .orchestrator
        .complete_booking(booking_id, req.attended)
        .await?;
    Ok(Json(booking.into()))
}

/// GET /v1/bookings/{id}/cancellation-preview
/// What the cancel dialog shows before the parent commits
async fn preview_cancellation(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<RefundDecision>, AppError> {
    Ok(Json(state.orchestrator.preview_cancellation(booking_id)?))
}

/// POST /v1/bookings/{id}/cancel
/// Runs on its own task so a dropped connection does not abandon the refund
async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CancelBookingRequest>,
) -> Result<Json<CancellationOutcome>, AppError> {
    info!("Cancellation of {} requested by {}", booking_id, req.initiated_by);
    let outcome = state
        .orchestrator
        .cancel_booking_detached(booking_id, req.initiated_by)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Cancellation task failed: {}", e)))??;
    Ok(Json(outcome))
}

/// POST /v1/bookings/{id}/refund/retry
async fn retry_refund(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<CancellationOutcome>, AppError> {
    Ok(Json(state.orchestrator.retry_refund(booking_id).await?))
}

/// GET /v1/refunds/pending
async fn list_pending_refunds(State(state): State<AppState>) -> Json<RefundSummary> {
    Json(RefundSummary {
        total_refunded: state.orchestrator.total_refunded(),
        pending: state.orchestrator.pending_refunds(),
    })
}
