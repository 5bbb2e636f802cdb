use axum::{routing::get, Json, Router};
use classbook_shared::BookingStatus;
use serde::Serialize;

use crate::state::AppState;

/// How a status is shown in the app. Not part of the domain model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusPresentation {
    pub status: BookingStatus,
    pub display_name: &'static str,
    pub badge_colour: &'static str,
}

pub fn presentation_for(status: BookingStatus) -> StatusPresentation {
    let (display_name, badge_colour) = match status {
        BookingStatus::Draft => ("Draft", "#9E9E9E"),
        BookingStatus::Pending => ("Awaiting confirmation", "#FFB300"),
        BookingStatus::Upcoming => ("Upcoming", "#1E88E5"),
        BookingStatus::InProgress => ("In progress", "#8E24AA"),
        BookingStatus::Completed => ("Completed", "#43A047"),
        BookingStatus::Cancelled => ("Cancelled", "#E53935"),
    };
    StatusPresentation {
        status,
        display_name,
        badge_colour,
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/presentation/statuses", get(list_statuses))
}

/// GET /v1/presentation/statuses
async fn list_statuses() -> Json<Vec<StatusPresentation>> {
    Json(BookingStatus::ALL.into_iter().map(presentation_for).collect())
}
