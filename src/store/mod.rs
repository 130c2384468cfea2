// src/store/mod.rs
//
// Storage ports. Adapters apply the workflow decisions atomically: every
// check-then-write on schedule occupancy happens under one lock or one
// database transaction.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{Booking, BookingError, Schedule, ScheduleStatus, SlotKey, TimeSlot};
use crate::workflow::{ApprovalAction, BookingAction, SchedulePatch};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time_type: TimeSlot,
    pub max_number: i32,
    pub status: ScheduleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time_type: TimeSlot,
}

impl NewBooking {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            time_type: self.time_type,
        }
    }
}

/// One doctor's schedules over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub doctor_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub approved_only: bool,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Fails with `duplicate_schedule` when the doctor already owns the slot.
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule, BookingError>;

    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Schedule, BookingError>;

    /// Ordered by date, then slot.
    async fn list_schedules(&self) -> Result<Vec<Schedule>, BookingError>;

    async fn list_pending_schedules(&self) -> Result<Vec<Schedule>, BookingError>;

    async fn list_doctor_schedules(
        &self,
        window: &ScheduleWindow,
    ) -> Result<Vec<Schedule>, BookingError>;

    async fn update_schedule(
        &self,
        schedule_id: Uuid,
        patch: &SchedulePatch,
    ) -> Result<Schedule, BookingError>;

    async fn decide_schedule(
        &self,
        schedule_id: Uuid,
        action: ApprovalAction,
    ) -> Result<Schedule, BookingError>;

    async fn delete_schedule(&self, schedule_id: Uuid) -> Result<(), BookingError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Check capacity, take one unit of occupancy and insert the booking at
    /// `pending_confirmation`, all or nothing.
    async fn place_booking(&self, new: NewBooking) -> Result<Booking, BookingError>;

    async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError>;

    async fn list_doctor_bookings(&self, doctor_id: Uuid) -> Result<Vec<Booking>, BookingError>;

    async fn list_patient_bookings(&self, patient_id: Uuid) -> Result<Vec<Booking>, BookingError>;

    /// Apply `action`; entering `cancelled` releases the slot in the same unit of work.
    /// `now` carries the clinic's local offset used to decide whether the slot is upcoming.
    async fn transition_booking(
        &self,
        booking_id: Uuid,
        action: BookingAction,
        now: DateTime<FixedOffset>,
    ) -> Result<Booking, BookingError>;

    /// Delete cancelled bookings last touched before `cutoff`. Returns the number removed.
    async fn purge_cancelled_bookings(&self, cutoff: DateTime<Utc>) -> Result<u64, BookingError>;
}
