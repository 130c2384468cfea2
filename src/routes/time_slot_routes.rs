use axum::{routing::get, Json, Router};
use chrono::NaiveTime;
use serde::Serialize;

use crate::{
    domain::TimeSlot,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/time-slots", get(list_time_slots))
}

#[derive(Debug, Serialize)]
pub struct TimeSlotDto {
    pub code: &'static str,
    pub label: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl From<TimeSlot> for TimeSlotDto {
    fn from(slot: TimeSlot) -> Self {
        Self {
            code: slot.code(),
            label: slot.label(),
            start: slot.start_time(),
            end: slot.end_time(),
        }
    }
}

// GET /time-slots
pub async fn list_time_slots(_auth: AuthContext) -> Json<ApiOk<Vec<TimeSlotDto>>> {
    Json(ApiOk {
        data: TimeSlot::ALL.into_iter().map(TimeSlotDto::from).collect(),
    })
}
