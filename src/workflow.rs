// src/workflow.rs
//
// Slot capacity & approval rules. Everything here is pure: storage adapters
// call these functions while holding the relevant row locks and persist the
// outcome themselves.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use serde::Deserialize;
use tracing::debug;

use crate::domain::{
    BookingError, BookingStatus, DenyReason, Schedule, ScheduleStatus, TimeSlot,
};

/// Decide whether `schedule` may take one more booking for a patient.
///
/// Rules are checked in order and the first failure wins:
/// approval, then capacity, then the patient's existing active booking.
pub fn can_accept_booking(
    schedule: &Schedule,
    patient_has_active_booking: bool,
) -> Result<(), DenyReason> {
    if schedule.status != ScheduleStatus::Approved {
        return Err(DenyReason::ScheduleNotApproved);
    }
    if schedule.current_number >= schedule.max_number {
        return Err(DenyReason::SlotFull);
    }
    if patient_has_active_booking {
        return Err(DenyReason::DuplicateBooking);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

/// Approve or reject a pending schedule. Both outcomes are terminal.
pub fn transition_schedule_approval(
    current: ScheduleStatus,
    action: ApprovalAction,
) -> Result<ScheduleStatus, DenyReason> {
    if current != ScheduleStatus::Pending {
        debug!(?current, ?action, "schedule approval refused");
        return Err(DenyReason::NotPending);
    }
    Ok(match action {
        ApprovalAction::Approve => ScheduleStatus::Approved,
        ApprovalAction::Reject => ScheduleStatus::Rejected,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Confirm,
    Cancel,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingTransition {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

impl BookingTransition {
    /// Entering `cancelled` hands one unit of capacity back to the schedule.
    pub fn releases_slot(&self) -> bool {
        self.to == BookingStatus::Cancelled && self.from != BookingStatus::Cancelled
    }
}

/// Single transition function for the booking lifecycle.
///
/// | from                 | action   | needs upcoming | to        |
/// |----------------------|----------|----------------|-----------|
/// | pending_confirmation | confirm  |                | confirmed |
/// | pending_confirmation | cancel   |                | cancelled |
/// | confirmed            | cancel   | yes            | cancelled |
/// | confirmed            | complete |                | completed |
pub fn transition_booking_status(
    current: BookingStatus,
    action: BookingAction,
    is_upcoming: bool,
) -> Result<BookingTransition, DenyReason> {
    use BookingAction::*;
    use BookingStatus::*;

    let to = match (current, action) {
        (PendingConfirmation, Confirm) => Confirmed,
        (PendingConfirmation, Cancel) => Cancelled,
        (Confirmed, Cancel) if is_upcoming => Cancelled,
        (Confirmed, Complete) => Completed,
        _ => {
            debug!(?current, ?action, is_upcoming, "booking transition refused");
            return Err(DenyReason::InvalidTransition);
        }
    };

    Ok(BookingTransition { from: current, to })
}

pub fn can_delete_schedule(schedule: &Schedule) -> Result<(), DenyReason> {
    if schedule.current_number == 0 {
        Ok(())
    } else {
        Err(DenyReason::HasActiveBookings)
    }
}

/// Occupancy after one booking leaves the slot. Never drops below zero.
pub fn release_occupancy(current_number: i32) -> i32 {
    (current_number - 1).max(0)
}

pub fn validate_capacity(max_number: i32) -> Result<i32, BookingError> {
    if max_number < 1 {
        return Err(BookingError::InvalidArgument(format!(
            "max_number must be >= 1 (got {max_number})"
        )));
    }
    Ok(max_number)
}

/// Requested edit of an existing schedule. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePatch {
    pub date: Option<NaiveDate>,
    pub time_type: Option<TimeSlot>,
    pub max_number: Option<i32>,
    /// Set when the editor cannot approve schedules. An approved schedule
    /// whose slot or capacity changes then goes back to `pending`.
    pub requires_review: bool,
}

impl SchedulePatch {
    fn moves_slot(&self, schedule: &Schedule) -> bool {
        self.date.is_some_and(|d| d != schedule.date)
            || self.time_type.is_some_and(|t| t != schedule.time_type)
    }

    fn changes(&self, schedule: &Schedule) -> bool {
        self.moves_slot(schedule) || self.max_number.is_some_and(|m| m != schedule.max_number)
    }

    /// The schedule as it would look after the edit.
    pub fn apply(&self, schedule: &Schedule) -> Schedule {
        let reopened = self.requires_review
            && schedule.status == ScheduleStatus::Approved
            && self.changes(schedule);

        Schedule {
            date: self.date.unwrap_or(schedule.date),
            time_type: self.time_type.unwrap_or(schedule.time_type),
            max_number: self.max_number.unwrap_or(schedule.max_number),
            status: if reopened { ScheduleStatus::Pending } else { schedule.status },
            ..schedule.clone()
        }
    }
}

/// Guard for schedule edits: capacity stays positive and above occupancy,
/// and a schedule with bookings cannot move to another date or slot.
pub fn can_update_schedule(schedule: &Schedule, patch: &SchedulePatch) -> Result<(), BookingError> {
    if let Some(max_number) = patch.max_number {
        validate_capacity(max_number)?;
        if max_number < schedule.current_number {
            return Err(DenyReason::CapacityBelowOccupancy.into());
        }
    }
    if patch.moves_slot(schedule) && schedule.current_number > 0 {
        return Err(DenyReason::HasActiveBookings.into());
    }
    Ok(())
}

/// True while the slot's start, read in the clinic's local offset, lies after `now`.
pub fn is_upcoming(date: NaiveDate, slot: TimeSlot, now: DateTime<FixedOffset>) -> bool {
    let start = date.and_time(slot.start_time());
    match now.offset().from_local_datetime(&start).single() {
        Some(start_at) => start_at > now,
        None => false,
    }
}
