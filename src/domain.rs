// src/domain.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/* ============================================================
   Time slots (legacy TIME codes T1..T8)
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TimeSlot {
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    T8,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 8] = [
        TimeSlot::T1,
        TimeSlot::T2,
        TimeSlot::T3,
        TimeSlot::T4,
        TimeSlot::T5,
        TimeSlot::T6,
        TimeSlot::T7,
        TimeSlot::T8,
    ];

    pub fn code(self) -> &'static str {
        match self {
            TimeSlot::T1 => "T1",
            TimeSlot::T2 => "T2",
            TimeSlot::T3 => "T3",
            TimeSlot::T4 => "T4",
            TimeSlot::T5 => "T5",
            TimeSlot::T6 => "T6",
            TimeSlot::T7 => "T7",
            TimeSlot::T8 => "T8",
        }
    }

    /// Hour of day the band starts at. There is no band over the 12:00 lunch break.
    fn start_hour(self) -> u32 {
        match self {
            TimeSlot::T1 => 8,
            TimeSlot::T2 => 9,
            TimeSlot::T3 => 10,
            TimeSlot::T4 => 11,
            TimeSlot::T5 => 13,
            TimeSlot::T6 => 14,
            TimeSlot::T7 => 15,
            TimeSlot::T8 => 16,
        }
    }

    pub fn start_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour(), 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn end_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour() + 1, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn label(self) -> String {
        format!(
            "{} - {}",
            self.start_time().format("%H:%M"),
            self.end_time().format("%H:%M")
        )
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TimeSlot {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeSlot::ALL
            .into_iter()
            .find(|slot| slot.code() == s.trim())
            .ok_or_else(|| BookingError::InvalidArgument(format!("unknown time slot code: {s}")))
    }
}

/* ============================================================
   Schedule
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Approved,
    Rejected,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Approved => "approved",
            ScheduleStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "approved" => Ok(ScheduleStatus::Approved),
            "rejected" => Ok(ScheduleStatus::Rejected),
            other => Err(BookingError::InvalidArgument(format!(
                "unknown schedule status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub schedule_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time_type: TimeSlot,
    pub max_number: i32,
    pub current_number: i32,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            time_type: self.time_type,
        }
    }
}

/// A doctor's slot on a given day. At most one schedule exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time_type: TimeSlot,
}

/* ============================================================
   Booking
   ============================================================ */

/// Booking status. Persisted with the legacy S1..S4 status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookingStatus {
    #[serde(rename = "S1")]
    PendingConfirmation,
    #[serde(rename = "S2")]
    Confirmed,
    #[serde(rename = "S3")]
    Cancelled,
    #[serde(rename = "S4")]
    Completed,
}

impl BookingStatus {
    pub fn code(self) -> &'static str {
        match self {
            BookingStatus::PendingConfirmation => "S1",
            BookingStatus::Confirmed => "S2",
            BookingStatus::Cancelled => "S3",
            BookingStatus::Completed => "S4",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BookingStatus::PendingConfirmation => "pending_confirmation",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Active bookings consume a unit of schedule capacity.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn from_code(code: &str) -> Result<Self, BookingError> {
        match code {
            "S1" => Ok(BookingStatus::PendingConfirmation),
            "S2" => Ok(BookingStatus::Confirmed),
            "S3" => Ok(BookingStatus::Cancelled),
            "S4" => Ok(BookingStatus::Completed),
            other => Err(BookingError::InvalidArgument(format!(
                "unknown booking status code: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub booking_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time_type: TimeSlot,
    pub status: BookingStatus,
    pub token: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            time_type: self.time_type,
        }
    }
}

/* ============================================================
   Outcomes
   ============================================================ */

/// Business-rule refusal. Expected outcome, never a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    ScheduleNotApproved,
    SlotFull,
    DuplicateBooking,
    NotPending,
    InvalidTransition,
    HasActiveBookings,
    CapacityBelowOccupancy,
    DuplicateSchedule,
}

impl DenyReason {
    /// Stable reason code handed to API clients.
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::ScheduleNotApproved => "schedule_not_approved",
            DenyReason::SlotFull => "slot_full",
            DenyReason::DuplicateBooking => "duplicate_booking",
            DenyReason::NotPending => "not_pending",
            DenyReason::InvalidTransition => "invalid_transition",
            DenyReason::HasActiveBookings => "has_active_bookings",
            DenyReason::CapacityBelowOccupancy => "capacity_below_occupancy",
            DenyReason::DuplicateSchedule => "duplicate_schedule",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DenyReason::ScheduleNotApproved => "This schedule is not open for booking",
            DenyReason::SlotFull => "This time slot is fully booked",
            DenyReason::DuplicateBooking => "You already have a booking for this time slot",
            DenyReason::NotPending => "Only pending schedules can be approved or rejected",
            DenyReason::InvalidTransition => "This booking cannot move to the requested status",
            DenyReason::HasActiveBookings => "This schedule still has active bookings",
            DenyReason::CapacityBelowOccupancy => {
                "Capacity cannot be lower than the number of active bookings"
            }
            DenyReason::DuplicateSchedule => "The doctor already has a schedule for this time slot",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("denied: {0}")]
    Denied(DenyReason),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DenyReason> for BookingError {
    fn from(reason: DenyReason) -> Self {
        BookingError::Denied(reason)
    }
}
