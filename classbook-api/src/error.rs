use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use classbook_booking::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::NotFound(_) | BookingError::ClassNotFound(_) => AppError::NotFoundError(message),
            BookingError::InvalidState { .. } | BookingError::InvalidTransition { .. } => {
                AppError::ConflictError(message)
            }
            BookingError::Validation(_) => AppError::ValidationError(message),
            BookingError::RemoteSyncFailed(_) => AppError::UpstreamError(message),
            BookingError::RefundFailed { .. }
            | BookingError::Snapshot(_)
            | BookingError::Interrupted(_) => {
                AppError::InternalServerError(message)
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classbook_shared::BookingStatus;
    use uuid::Uuid;

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_booking_errors_map_to_status_codes() {
        assert_eq!(status_of(BookingError::NotFound(Uuid::new_v4())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(BookingError::not_cancellable(BookingStatus::Cancelled)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BookingError::InvalidTransition {
                from: BookingStatus::Upcoming,
                to: BookingStatus::Pending,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(BookingError::Validation("zero".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(BookingError::RemoteSyncFailed("offline".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(BookingError::Snapshot("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
