// src/routes/schedule_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    domain::{Schedule, ScheduleStatus, TimeSlot},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, ScheduleDto},
    store::{NewSchedule, ScheduleWindow},
    workflow::{ApprovalAction, SchedulePatch},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route("/schedules/pending/list", get(list_pending_schedules))
        .route("/schedules/doctor/{doctor_id}", get(get_doctor_schedules))
        .route(
            "/schedules/{schedule_id}",
            get(get_schedule).put(update_schedule).delete(delete_schedule),
        )
        .route("/schedules/{schedule_id}/approve", put(approve_schedule))
        .route("/schedules/{schedule_id}/reject", put(reject_schedule))
}

/* ============================================================
   Access rules
   ============================================================ */

fn ensure_owner_or_admin(auth: &AuthContext, schedule: &Schedule) -> Result<(), ApiError> {
    if auth.is_admin() || (auth.is_doctor() && auth.user_id == schedule.doctor_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the owning doctor or an admin can change this schedule"))
    }
}

// Approved schedules are public; pending/rejected ones only to their doctor and admins.
fn ensure_can_view(auth: &AuthContext, schedule: &Schedule) -> Result<(), ApiError> {
    if schedule.status == ScheduleStatus::Approved {
        return Ok(());
    }
    ensure_owner_or_admin(auth, schedule)
}

/// Doctors create schedules for themselves, pending review.
/// Admins create them for any doctor, already approved.
fn resolve_creation(
    auth: &AuthContext,
    requested_doctor: Option<Uuid>,
) -> Result<(Uuid, ScheduleStatus), ApiError> {
    if auth.is_admin() {
        let doctor_id = requested_doctor
            .ok_or_else(|| ApiError::validation("doctor_id is required for admin users"))?;
        return Ok((doctor_id, ScheduleStatus::Approved));
    }

    if auth.is_doctor() {
        if requested_doctor.is_some_and(|id| id != auth.user_id) {
            return Err(ApiError::forbidden("Doctor can only create their own schedules"));
        }
        return Ok((auth.user_id, ScheduleStatus::Pending));
    }

    Err(ApiError::forbidden("Only doctors and admins can create schedules"))
}

fn parse_time_slot(raw: &str) -> Result<TimeSlot, ApiError> {
    raw.parse::<TimeSlot>().map_err(ApiError::from)
}

/* ============================================================
   Queries
   ============================================================ */

pub async fn list_schedules(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ScheduleDto>>>, ApiError> {
    auth.ensure_admin()?;
    let rows = state.schedules.list_schedules().await?;
    Ok(Json(ApiOk {
        data: rows.into_iter().map(ScheduleDto::from).collect(),
    }))
}

pub async fn list_pending_schedules(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ScheduleDto>>>, ApiError> {
    auth.ensure_admin()?;
    let rows = state.schedules.list_pending_schedules().await?;
    Ok(Json(ApiOk {
        data: rows.into_iter().map(ScheduleDto::from).collect(),
    }))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ApiOk<ScheduleDto>>, ApiError> {
    let schedule = state.schedules.get_schedule(schedule_id).await?;
    ensure_can_view(&auth, &schedule)?;
    Ok(Json(ApiOk { data: schedule.into() }))
}

#[derive(Debug, Deserialize)]
pub struct DoctorScheduleQuery {
    // YYYY-MM-DD, defaults to today in clinic time
    pub date: Option<String>,
    pub include_all: Option<bool>,
}

fn doctor_window(
    auth: &AuthContext,
    doctor_id: Uuid,
    start: NaiveDate,
    window_days: i64,
    include_all: bool,
) -> Result<ScheduleWindow, ApiError> {
    let to = u64::try_from(window_days)
        .ok()
        .and_then(|days| start.checked_add_days(Days::new(days)))
        .ok_or_else(|| ApiError::validation("date out of range"))?;

    // Only the doctor themself and admins may look past approved schedules.
    let may_see_all = auth.is_admin() || (auth.is_doctor() && auth.user_id == doctor_id);
    Ok(ScheduleWindow {
        doctor_id,
        from: start,
        to,
        approved_only: !(include_all && may_see_all),
    })
}

pub async fn get_doctor_schedules(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Query(q): Query<DoctorScheduleQuery>,
) -> Result<Json<ApiOk<Vec<ScheduleDto>>>, ApiError> {
    let start = match q.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| ApiError::validation("date must be YYYY-MM-DD"))?,
        None => state.clinic_today(),
    };

    let window = doctor_window(
        &auth,
        doctor_id,
        start,
        state.settings.schedule_window_days,
        q.include_all.unwrap_or(false),
    )?;
    let rows = state.schedules.list_doctor_schedules(&window).await?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(ScheduleDto::from).collect(),
    }))
}

/* ============================================================
   POST /schedules (create)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time_type: String,
    pub max_number: Option<i32>,
}

pub async fn create_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<Json<ApiOk<ScheduleDto>>, ApiError> {
    let (doctor_id, status) = resolve_creation(&auth, req.doctor_id)?;
    let time_type = parse_time_slot(&req.time_type)?;

    if req.date < state.clinic_today() {
        return Err(ApiError::validation("date must not be in the past"));
    }

    let schedule = state
        .schedules
        .create_schedule(NewSchedule {
            doctor_id,
            date: req.date,
            time_type,
            max_number: req.max_number.unwrap_or(state.settings.default_max_number),
            status,
        })
        .await?;

    tracing::info!(
        schedule_id = %schedule.schedule_id,
        %doctor_id,
        date = %schedule.date,
        time_type = %schedule.time_type,
        status = schedule.status.as_str(),
        "schedule created"
    );
    Ok(Json(ApiOk { data: schedule.into() }))
}

/* ============================================================
   PUT /schedules/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub date: Option<NaiveDate>,
    pub time_type: Option<String>,
    pub max_number: Option<i32>,
}

pub async fn update_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<ApiOk<ScheduleDto>>, ApiError> {
    let current = state.schedules.get_schedule(schedule_id).await?;
    ensure_owner_or_admin(&auth, &current)?;

    if req.date.is_some_and(|d| d < state.clinic_today()) {
        return Err(ApiError::validation("date must not be in the past"));
    }

    let patch = SchedulePatch {
        date: req.date,
        time_type: req.time_type.as_deref().map(parse_time_slot).transpose()?,
        max_number: req.max_number,
        requires_review: !auth.is_admin(),
    };
    let schedule = state.schedules.update_schedule(schedule_id, &patch).await?;

    tracing::info!(
        %schedule_id,
        editor_id = %auth.user_id,
        status = schedule.status.as_str(),
        "schedule updated"
    );
    Ok(Json(ApiOk { data: schedule.into() }))
}

/* ============================================================
   Approval
   ============================================================ */

async fn decide(
    state: &AppState,
    auth: &AuthContext,
    schedule_id: Uuid,
    action: ApprovalAction,
) -> Result<Json<ApiOk<ScheduleDto>>, ApiError> {
    auth.ensure_admin()?;
    let schedule = state.schedules.decide_schedule(schedule_id, action).await?;

    tracing::info!(
        %schedule_id,
        admin_id = %auth.user_id,
        status = schedule.status.as_str(),
        "schedule reviewed"
    );
    Ok(Json(ApiOk { data: schedule.into() }))
}

pub async fn approve_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ApiOk<ScheduleDto>>, ApiError> {
    decide(&state, &auth, schedule_id, ApprovalAction::Approve).await
}

pub async fn reject_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ApiOk<ScheduleDto>>, ApiError> {
    decide(&state, &auth, schedule_id, ApprovalAction::Reject).await
}

/* ============================================================
   DELETE /schedules/{id}
   ============================================================ */

pub async fn delete_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let current = state.schedules.get_schedule(schedule_id).await?;
    ensure_owner_or_admin(&auth, &current)?;

    state.schedules.delete_schedule(schedule_id).await?;

    tracing::info!(%schedule_id, "schedule deleted");
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
