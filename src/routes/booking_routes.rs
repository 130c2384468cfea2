// src/routes/booking_routes.rs

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{Booking, TimeSlot},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, BookingDto},
    store::NewBooking,
    workflow::{self, BookingAction},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/cleanup", delete(cleanup_cancelled_bookings))
        .route("/bookings/doctor/{doctor_id}", get(list_doctor_bookings))
        .route("/bookings/patient/{patient_id}", get(list_patient_bookings))
        .route("/bookings/cancel/{booking_id}", put(cancel_booking))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/{booking_id}/status", put(update_booking_status))
}

/* ============================================================
   Access rules
   ============================================================ */

fn is_party(auth: &AuthContext, booking: &Booking) -> bool {
    auth.user_id == booking.patient_id || auth.user_id == booking.doctor_id
}

fn ensure_can_view(auth: &AuthContext, booking: &Booking) -> Result<(), ApiError> {
    if auth.is_admin() || is_party(auth, booking) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only view your own bookings"))
    }
}

/// Doctors (on their own bookings) and admins may take any action.
/// Patients may only cancel their own booking.
fn ensure_can_act(
    auth: &AuthContext,
    booking: &Booking,
    action: BookingAction,
) -> Result<(), ApiError> {
    if auth.is_admin() {
        return Ok(());
    }
    if auth.is_doctor() && auth.user_id == booking.doctor_id {
        return Ok(());
    }
    if auth.is_patient() && auth.user_id == booking.patient_id {
        return match action {
            BookingAction::Cancel => Ok(()),
            _ => Err(ApiError::forbidden("Patients can only cancel their bookings")),
        };
    }
    Err(ApiError::forbidden("You cannot change this booking"))
}

/// Patients book for themselves; admins book on behalf of a named patient.
fn resolve_patient(auth: &AuthContext, requested: Option<Uuid>) -> Result<Uuid, ApiError> {
    if auth.is_admin() {
        return requested
            .ok_or_else(|| ApiError::validation("patient_id is required for admin users"));
    }
    if auth.is_patient() {
        if requested.is_some_and(|id| id != auth.user_id) {
            return Err(ApiError::forbidden("Patients can only book for themselves"));
        }
        return Ok(auth.user_id);
    }
    Err(ApiError::forbidden("Only patients and admins can create bookings"))
}

fn to_dtos(rows: Vec<Booking>) -> Vec<BookingDto> {
    rows.into_iter().map(BookingDto::from).collect()
}

/* ============================================================
   POST /bookings
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub doctor_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time_type: String,
}

pub async fn create_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<ApiOk<BookingDto>>, ApiError> {
    let patient_id = resolve_patient(&auth, req.patient_id)?;
    let time_type: TimeSlot = req.time_type.parse()?;

    if !workflow::is_upcoming(req.date, time_type, state.clinic_now()) {
        return Err(ApiError::validation("time slot has already started"));
    }

    let booking = state
        .bookings
        .place_booking(NewBooking {
            doctor_id: req.doctor_id,
            patient_id,
            date: req.date,
            time_type,
        })
        .await?;

    tracing::info!(
        booking_id = %booking.booking_id,
        doctor_id = %booking.doctor_id,
        %patient_id,
        date = %booking.date,
        time_type = %booking.time_type,
        "booking placed"
    );
    Ok(Json(ApiOk { data: booking.into() }))
}

/* ============================================================
   Queries
   ============================================================ */

pub async fn get_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<BookingDto>>, ApiError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    ensure_can_view(&auth, &booking)?;
    Ok(Json(ApiOk { data: booking.into() }))
}

pub async fn list_doctor_bookings(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<BookingDto>>>, ApiError> {
    if !(auth.is_admin() || (auth.is_doctor() && auth.user_id == doctor_id)) {
        return Err(ApiError::forbidden("Doctor can only view their own bookings"));
    }
    let rows = state.bookings.list_doctor_bookings(doctor_id).await?;
    Ok(Json(ApiOk { data: to_dtos(rows) }))
}

pub async fn list_patient_bookings(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<BookingDto>>>, ApiError> {
    if !auth.is_self_or_admin(patient_id) {
        return Err(ApiError::forbidden("You can only view your own bookings"));
    }
    let rows = state.bookings.list_patient_bookings(patient_id).await?;
    Ok(Json(ApiOk { data: to_dtos(rows) }))
}

/* ============================================================
   Status transitions
   ============================================================ */

/// Either `{"action": "confirm"}` or the legacy `{"status_id": "S2"}` shape.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub action: Option<BookingAction>,
    #[serde(alias = "statusId")]
    pub status_id: Option<String>,
}

fn action_for_status_code(code: &str) -> Result<BookingAction, ApiError> {
    match code.trim() {
        "S2" => Ok(BookingAction::Confirm),
        "S3" => Ok(BookingAction::Cancel),
        "S4" => Ok(BookingAction::Complete),
        other => Err(ApiError::validation(format!(
            "status_id must be S2, S3 or S4 (got {other})"
        ))),
    }
}

impl UpdateStatusRequest {
    fn action(&self) -> Result<BookingAction, ApiError> {
        match (&self.action, &self.status_id) {
            (Some(action), _) => Ok(*action),
            (None, Some(code)) => action_for_status_code(code),
            (None, None) => Err(ApiError::validation("action is required")),
        }
    }
}

async fn apply_action(
    state: &AppState,
    auth: &AuthContext,
    booking_id: Uuid,
    action: BookingAction,
) -> Result<Json<ApiOk<BookingDto>>, ApiError> {
    let current = state.bookings.get_booking(booking_id).await?;
    ensure_can_act(auth, &current, action)?;

    let booking = state
        .bookings
        .transition_booking(booking_id, action, state.clinic_now())
        .await?;

    tracing::info!(
        %booking_id,
        actor_id = %auth.user_id,
        ?action,
        status = booking.status.name(),
        "booking status changed"
    );
    Ok(Json(ApiOk { data: booking.into() }))
}

pub async fn update_booking_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiOk<BookingDto>>, ApiError> {
    let action = req.action()?;
    apply_action(&state, &auth, booking_id, action).await
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ApiOk<BookingDto>>, ApiError> {
    apply_action(&state, &auth, booking_id, BookingAction::Cancel).await
}

/* ============================================================
   DELETE /bookings/cleanup
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct CleanupData {
    pub deleted: u64,
}

fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> Result<DateTime<Utc>, ApiError> {
    TimeDelta::try_days(retention_days)
        .and_then(|keep| now.checked_sub_signed(keep))
        .ok_or_else(|| ApiError::Internal(format!("retention out of range: {retention_days} days")))
}

pub async fn cleanup_cancelled_bookings(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<CleanupData>>, ApiError> {
    auth.ensure_admin()?;

    let cutoff = retention_cutoff(Utc::now(), state.settings.cancelled_retention_days)?;
    let deleted = state.bookings.purge_cancelled_bookings(cutoff).await?;

    tracing::info!(deleted, %cutoff, "purged cancelled bookings");
    Ok(Json(ApiOk {
        data: CleanupData { deleted },
    }))
}
