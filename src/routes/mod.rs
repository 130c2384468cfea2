use crate::models::AppState;
use axum::Router;

pub mod booking_routes;
pub mod schedule_routes;
pub mod time_slot_routes;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(schedule_routes::router())
        .merge(booking_routes::router())
        .merge(time_slot_routes::router());

    Router::new().nest("/api/v1", api).with_state(state)
}
