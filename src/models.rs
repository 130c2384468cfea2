use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::BookingSettings;
use crate::domain::{Booking, Schedule};
use crate::store::{BookingStore, ScheduleStore};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub schedules: Arc<dyn ScheduleStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub settings: BookingSettings,
}

impl AppState {
    /// Current time read in the clinic's offset.
    pub fn clinic_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.settings.clinic_offset)
    }

    pub fn clinic_today(&self) -> NaiveDate {
        self.clinic_now().date_naive()
    }
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ScheduleDto {
    pub schedule_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time_type: String,
    pub time_label: String,
    pub max_number: i32,
    pub current_number: i32,
    pub available: i32,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Schedule> for ScheduleDto {
    fn from(s: Schedule) -> Self {
        Self {
            schedule_id: s.schedule_id,
            doctor_id: s.doctor_id,
            date: s.date,
            time_type: s.time_type.code().to_string(),
            time_label: s.time_type.label(),
            max_number: s.max_number,
            current_number: s.current_number,
            available: (s.max_number - s.current_number).max(0),
            status: s.status.as_str(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingDto {
    pub booking_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time_type: String,
    pub time_label: String,
    pub status_id: &'static str,
    pub status: &'static str,
    /// Holds a seat on the schedule.
    pub active: bool,
    pub token: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingDto {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.booking_id,
            doctor_id: b.doctor_id,
            patient_id: b.patient_id,
            date: b.date,
            time_type: b.time_type.code().to_string(),
            time_label: b.time_type.label(),
            status_id: b.status.code(),
            status: b.status.name(),
            active: b.status.is_active(),
            token: b.token,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

/* -------------------------
   Helpers
--------------------------*/

/// Role codes stored in users.role_id.
/// R1 patient, R2 doctor, R3 admin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn from_code(code: &str) -> Option<Role> {
        match code {
            "R1" => Some(Role::Patient),
            "R2" => Some(Role::Doctor),
            "R3" => Some(Role::Admin),
            _ => None,
        }
    }
}
