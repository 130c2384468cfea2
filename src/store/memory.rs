// src/store/memory.rs
//
// In-process store for tests. One mutex guards both tables, so every
// operation is a single critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Booking, BookingError, BookingStatus, DenyReason, Schedule, ScheduleStatus};
use crate::store::{BookingStore, NewBooking, NewSchedule, ScheduleStore, ScheduleWindow};
use crate::workflow::{self, ApprovalAction, BookingAction, SchedulePatch};

#[derive(Default)]
struct Tables {
    schedules: HashMap<Uuid, Schedule>,
    bookings: HashMap<Uuid, Booking>,
}

impl Tables {
    fn schedule_for_slot_mut(&mut self, booking: &Booking) -> Option<&mut Schedule> {
        let key = booking.slot_key();
        self.schedules.values_mut().find(|s| s.slot_key() == key)
    }
}

fn in_window(window: &ScheduleWindow, schedule: &Schedule) -> bool {
    schedule.doctor_id == window.doctor_id
        && schedule.date >= window.from
        && schedule.date <= window.to
        && (!window.approved_only || schedule.status == ScheduleStatus::Approved)
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut schedules: Vec<Schedule>) -> Vec<Schedule> {
    schedules.sort_by_key(|s| (s.date, s.time_type, s.created_at));
    schedules
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule, BookingError> {
        workflow::validate_capacity(new.max_number)?;
        let mut tables = self.tables.lock().await;

        let taken = tables.schedules.values().any(|s| {
            s.doctor_id == new.doctor_id && s.date == new.date && s.time_type == new.time_type
        });
        if taken {
            return Err(DenyReason::DuplicateSchedule.into());
        }

        let now = Utc::now();
        let schedule = Schedule {
            schedule_id: Uuid::new_v4(),
            doctor_id: new.doctor_id,
            date: new.date,
            time_type: new.time_type,
            max_number: new.max_number,
            current_number: 0,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        tables.schedules.insert(schedule.schedule_id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Schedule, BookingError> {
        self.tables
            .lock()
            .await
            .schedules
            .get(&schedule_id)
            .cloned()
            .ok_or(BookingError::NotFound("schedule"))
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, BookingError> {
        let tables = self.tables.lock().await;
        Ok(sorted(tables.schedules.values().cloned().collect()))
    }

    async fn list_pending_schedules(&self) -> Result<Vec<Schedule>, BookingError> {
        let tables = self.tables.lock().await;
        Ok(sorted(
            tables
                .schedules
                .values()
                .filter(|s| s.status == ScheduleStatus::Pending)
                .cloned()
                .collect(),
        ))
    }

    async fn list_doctor_schedules(
        &self,
        window: &ScheduleWindow,
    ) -> Result<Vec<Schedule>, BookingError> {
        let tables = self.tables.lock().await;
        Ok(sorted(
            tables
                .schedules
                .values()
                .filter(|s| in_window(window, s))
                .cloned()
                .collect(),
        ))
    }

    async fn update_schedule(
        &self,
        schedule_id: Uuid,
        patch: &SchedulePatch,
    ) -> Result<Schedule, BookingError> {
        let mut tables = self.tables.lock().await;
        let current = tables
            .schedules
            .get(&schedule_id)
            .cloned()
            .ok_or(BookingError::NotFound("schedule"))?;

        workflow::can_update_schedule(&current, patch)?;
        let mut updated = patch.apply(&current);

        let collides = tables.schedules.values().any(|s| {
            s.schedule_id != schedule_id && s.slot_key() == updated.slot_key()
        });
        if collides {
            return Err(DenyReason::DuplicateSchedule.into());
        }

        updated.updated_at = Utc::now();
        tables.schedules.insert(schedule_id, updated.clone());
        Ok(updated)
    }

    async fn decide_schedule(
        &self,
        schedule_id: Uuid,
        action: ApprovalAction,
    ) -> Result<Schedule, BookingError> {
        let mut tables = self.tables.lock().await;
        let schedule = tables
            .schedules
            .get_mut(&schedule_id)
            .ok_or(BookingError::NotFound("schedule"))?;

        schedule.status = workflow::transition_schedule_approval(schedule.status, action)?;
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn delete_schedule(&self, schedule_id: Uuid) -> Result<(), BookingError> {
        let mut tables = self.tables.lock().await;
        let schedule = tables
            .schedules
            .get(&schedule_id)
            .ok_or(BookingError::NotFound("schedule"))?;

        workflow::can_delete_schedule(schedule)?;
        tables.schedules.remove(&schedule_id);
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn place_booking(&self, new: NewBooking) -> Result<Booking, BookingError> {
        let mut tables = self.tables.lock().await;

        let has_active = tables.bookings.values().any(|b| {
            b.status.is_active()
                && b.patient_id == new.patient_id
                && b.doctor_id == new.doctor_id
                && b.date == new.date
                && b.time_type == new.time_type
        });

        let schedule = tables
            .schedules
            .values_mut()
            .find(|s| s.slot_key() == new.slot_key())
            .ok_or(BookingError::NotFound("schedule"))?;

        workflow::can_accept_booking(schedule, has_active)?;
        let now = Utc::now();
        schedule.current_number += 1;
        schedule.updated_at = now;

        let booking = Booking {
            booking_id: Uuid::new_v4(),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            date: new.date,
            time_type: new.time_type,
            status: BookingStatus::PendingConfirmation,
            token: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        tables.bookings.insert(booking.booking_id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.tables
            .lock()
            .await
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(BookingError::NotFound("booking"))
    }

    async fn list_doctor_bookings(&self, doctor_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let tables = self.tables.lock().await;
        let mut out: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.doctor_id == doctor_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.date, b.time_type, b.created_at));
        Ok(out)
    }

    async fn list_patient_bookings(&self, patient_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let tables = self.tables.lock().await;
        let mut out: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.patient_id == patient_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.date, b.time_type, b.created_at));
        Ok(out)
    }

    async fn transition_booking(
        &self,
        booking_id: Uuid,
        action: BookingAction,
        now: DateTime<FixedOffset>,
    ) -> Result<Booking, BookingError> {
        let mut tables = self.tables.lock().await;
        let mut booking = tables
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(BookingError::NotFound("booking"))?;

        let upcoming = workflow::is_upcoming(booking.date, booking.time_type, now);
        let transition = workflow::transition_booking_status(booking.status, action, upcoming)?;

        if transition.releases_slot() {
            if let Some(schedule) = tables.schedule_for_slot_mut(&booking) {
                schedule.current_number = workflow::release_occupancy(schedule.current_number);
                schedule.updated_at = now.with_timezone(&Utc);
            }
        }

        booking.status = transition.to;
        booking.updated_at = now.with_timezone(&Utc);
        tables.bookings.insert(booking_id, booking.clone());
        Ok(booking)
    }

    async fn purge_cancelled_bookings(&self, cutoff: DateTime<Utc>) -> Result<u64, BookingError> {
        let mut tables = self.tables.lock().await;
        let before = tables.bookings.len();
        tables
            .bookings
            .retain(|_, b| !(b.status == BookingStatus::Cancelled && b.updated_at < cutoff));
        Ok((before - tables.bookings.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::domain::TimeSlot;

    fn clinic_now() -> DateTime<FixedOffset> {
        Utc::now().fixed_offset()
    }

    fn future_date() -> NaiveDate {
        Utc::now().date_naive() + Duration::days(30)
    }

    async fn approved_schedule(store: &MemoryStore, max_number: i32) -> Schedule {
        store
            .create_schedule(NewSchedule {
                doctor_id: Uuid::new_v4(),
                date: future_date(),
                time_type: TimeSlot::T2,
                max_number,
                status: ScheduleStatus::Approved,
            })
            .await
            .unwrap()
    }

    fn booking_for(schedule: &Schedule, patient_id: Uuid) -> NewBooking {
        NewBooking {
            doctor_id: schedule.doctor_id,
            patient_id,
            date: schedule.date,
            time_type: schedule.time_type,
        }
    }

    #[tokio::test]
    async fn single_seat_fills_then_denies_next_patient() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 1).await;

        let first = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();
        assert_eq!(first.status, BookingStatus::PendingConfirmation);
        assert_eq!(store.get_schedule(schedule.schedule_id).await.unwrap().current_number, 1);

        let second = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await;
        assert_eq!(second, Err(BookingError::Denied(DenyReason::SlotFull)));
        assert_eq!(store.get_schedule(schedule.schedule_id).await.unwrap().current_number, 1);
    }

    #[tokio::test]
    async fn pending_schedule_refuses_bookings() {
        let store = MemoryStore::new();
        let schedule = store
            .create_schedule(NewSchedule {
                doctor_id: Uuid::new_v4(),
                date: future_date(),
                time_type: TimeSlot::T1,
                max_number: 5,
                status: ScheduleStatus::Pending,
            })
            .await
            .unwrap();

        let res = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await;
        assert_eq!(res, Err(BookingError::Denied(DenyReason::ScheduleNotApproved)));
    }

    #[tokio::test]
    async fn same_patient_cannot_hold_two_active_bookings_on_a_slot() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 5).await;
        let patient = Uuid::new_v4();

        let first = store.place_booking(booking_for(&schedule, patient)).await.unwrap();
        for _ in 0..3 {
            let again = store.place_booking(booking_for(&schedule, patient)).await;
            assert_eq!(again, Err(BookingError::Denied(DenyReason::DuplicateBooking)));
        }

        // after cancelling, the patient may book the slot again
        store
            .transition_booking(first.booking_id, BookingAction::Cancel, clinic_now())
            .await
            .unwrap();
        assert!(store.place_booking(booking_for(&schedule, patient)).await.is_ok());
    }

    #[tokio::test]
    async fn booking_without_schedule_is_not_found() {
        let store = MemoryStore::new();
        let res = store
            .place_booking(NewBooking {
                doctor_id: Uuid::new_v4(),
                patient_id: Uuid::new_v4(),
                date: future_date(),
                time_type: TimeSlot::T4,
            })
            .await;
        assert_eq!(res, Err(BookingError::NotFound("schedule")));
    }

    #[tokio::test]
    async fn cancel_restores_occupancy_exactly() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 3).await;
        store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();
        let before = store.get_schedule(schedule.schedule_id).await.unwrap().current_number;

        let booking = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();
        store
            .transition_booking(booking.booking_id, BookingAction::Confirm, clinic_now())
            .await
            .unwrap();
        let cancelled = store
            .transition_booking(booking.booking_id, BookingAction::Cancel, clinic_now())
            .await
            .unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(store.get_schedule(schedule.schedule_id).await.unwrap().current_number, before);
    }

    #[tokio::test]
    async fn completed_booking_cannot_be_cancelled() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 2).await;
        let booking = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();

        for action in [BookingAction::Confirm, BookingAction::Complete] {
            store.transition_booking(booking.booking_id, action, clinic_now()).await.unwrap();
        }
        let res = store
            .transition_booking(booking.booking_id, BookingAction::Cancel, clinic_now())
            .await;

        assert_eq!(res, Err(BookingError::Denied(DenyReason::InvalidTransition)));
        assert_eq!(store.get_schedule(schedule.schedule_id).await.unwrap().current_number, 1);
    }

    #[tokio::test]
    async fn confirmed_booking_in_the_past_cannot_be_cancelled() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 2).await;
        let booking = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();
        store
            .transition_booking(booking.booking_id, BookingAction::Confirm, clinic_now())
            .await
            .unwrap();

        let after_slot = clinic_now() + Duration::days(60);
        let res = store
            .transition_booking(booking.booking_id, BookingAction::Cancel, after_slot)
            .await;
        assert_eq!(res, Err(BookingError::Denied(DenyReason::InvalidTransition)));
    }

    #[tokio::test]
    async fn approval_is_one_shot() {
        let store = MemoryStore::new();
        let schedule = store
            .create_schedule(NewSchedule {
                doctor_id: Uuid::new_v4(),
                date: future_date(),
                time_type: TimeSlot::T6,
                max_number: 2,
                status: ScheduleStatus::Pending,
            })
            .await
            .unwrap();

        let approved = store
            .decide_schedule(schedule.schedule_id, ApprovalAction::Approve)
            .await
            .unwrap();
        assert_eq!(approved.status, ScheduleStatus::Approved);

        let again = store.decide_schedule(schedule.schedule_id, ApprovalAction::Reject).await;
        assert_eq!(again, Err(BookingError::Denied(DenyReason::NotPending)));
        assert_eq!(
            store.get_schedule(schedule.schedule_id).await.unwrap().status,
            ScheduleStatus::Approved
        );
        assert!(store.list_pending_schedules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_guard_follows_occupancy() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 2).await;
        let booking = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();

        assert_eq!(
            store.delete_schedule(schedule.schedule_id).await,
            Err(BookingError::Denied(DenyReason::HasActiveBookings))
        );

        store
            .transition_booking(booking.booking_id, BookingAction::Cancel, clinic_now())
            .await
            .unwrap();
        assert_eq!(store.delete_schedule(schedule.schedule_id).await, Ok(()));
        assert_eq!(
            store.get_schedule(schedule.schedule_id).await,
            Err(BookingError::NotFound("schedule"))
        );
    }

    #[tokio::test]
    async fn duplicate_schedule_slot_is_denied() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 2).await;
        let res = store
            .create_schedule(NewSchedule {
                doctor_id: schedule.doctor_id,
                date: schedule.date,
                time_type: schedule.time_type,
                max_number: 9,
                status: ScheduleStatus::Pending,
            })
            .await;
        assert_eq!(res, Err(BookingError::Denied(DenyReason::DuplicateSchedule)));
    }

    #[tokio::test]
    async fn occupied_schedule_keeps_its_slot_and_capacity_floor() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 3).await;
        store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();
        store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();

        let shrink = SchedulePatch {
            max_number: Some(1),
            ..Default::default()
        };
        assert_eq!(
            store.update_schedule(schedule.schedule_id, &shrink).await,
            Err(BookingError::Denied(DenyReason::CapacityBelowOccupancy))
        );

        let moved = SchedulePatch {
            time_type: Some(TimeSlot::T7),
            ..Default::default()
        };
        assert_eq!(
            store.update_schedule(schedule.schedule_id, &moved).await,
            Err(BookingError::Denied(DenyReason::HasActiveBookings))
        );

        let grow = SchedulePatch {
            max_number: Some(2),
            ..Default::default()
        };
        let updated = store.update_schedule(schedule.schedule_id, &grow).await.unwrap();
        assert_eq!(updated.max_number, 2);
        assert_eq!(updated.current_number, 2);
    }

    #[tokio::test]
    async fn doctor_moving_an_approved_schedule_needs_new_approval() {
        let store = MemoryStore::new();
        let schedule = store
            .create_schedule(NewSchedule {
                doctor_id: Uuid::new_v4(),
                date: future_date(),
                time_type: TimeSlot::T1,
                max_number: 5,
                status: ScheduleStatus::Pending,
            })
            .await
            .unwrap();
        store.decide_schedule(schedule.schedule_id, ApprovalAction::Approve).await.unwrap();

        let patch = SchedulePatch {
            date: Some(schedule.date + Duration::days(5)),
            time_type: Some(TimeSlot::T8),
            max_number: Some(50),
            requires_review: true,
        };
        let moved = store.update_schedule(schedule.schedule_id, &patch).await.unwrap();
        assert_eq!(moved.status, ScheduleStatus::Pending);

        let patient = Uuid::new_v4();
        assert_eq!(
            store.place_booking(booking_for(&moved, patient)).await,
            Err(BookingError::Denied(DenyReason::ScheduleNotApproved))
        );

        store.decide_schedule(schedule.schedule_id, ApprovalAction::Approve).await.unwrap();
        assert!(store.place_booking(booking_for(&moved, patient)).await.is_ok());
    }

    #[tokio::test]
    async fn doctor_window_filters_by_date_and_approval() {
        let store = MemoryStore::new();
        let doctor_id = Uuid::new_v4();
        let start = future_date();

        for (offset, status) in [
            (0, ScheduleStatus::Approved),
            (1, ScheduleStatus::Pending),
            (3, ScheduleStatus::Approved),
            (4, ScheduleStatus::Approved),
        ] {
            store
                .create_schedule(NewSchedule {
                    doctor_id,
                    date: start + Duration::days(offset),
                    time_type: TimeSlot::T1,
                    max_number: 5,
                    status,
                })
                .await
                .unwrap();
        }

        let mut window = ScheduleWindow {
            doctor_id,
            from: start,
            to: start + Duration::days(3),
            approved_only: true,
        };
        let visible = store.list_doctor_schedules(&window).await.unwrap();
        assert_eq!(visible.len(), 2);
        assert!(visible.windows(2).all(|w| w[0].date <= w[1].date));

        window.approved_only = false;
        assert_eq!(store.list_doctor_schedules(&window).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn purge_only_removes_old_cancelled_bookings() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 5).await;
        let kept = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();
        let gone = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await.unwrap();
        store
            .transition_booking(gone.booking_id, BookingAction::Cancel, clinic_now())
            .await
            .unwrap();

        assert_eq!(store.purge_cancelled_bookings(Utc::now() - Duration::days(7)).await, Ok(0));
        assert_eq!(store.purge_cancelled_bookings(Utc::now() + Duration::seconds(1)).await, Ok(1));
        assert!(store.get_booking(kept.booking_id).await.is_ok());
        assert_eq!(
            store.get_booking(gone.booking_id).await,
            Err(BookingError::NotFound("booking"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_never_overbook() {
        const CAPACITY: i32 = 5;
        const EXTRA: usize = 7;

        let store = Arc::new(MemoryStore::new());
        let schedule = approved_schedule(&store, CAPACITY).await;

        let mut handles = Vec::new();
        for _ in 0..(CAPACITY as usize + EXTRA) {
            let store = Arc::clone(&store);
            let new = booking_for(&schedule, Uuid::new_v4());
            handles.push(tokio::spawn(async move { store.place_booking(new).await }));
        }

        let mut accepted = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(BookingError::Denied(DenyReason::SlotFull)) => full += 1,
                Err(other) => panic!("unexpected outcome: {other}"),
            }
        }

        assert_eq!(accepted, CAPACITY as usize);
        assert_eq!(full, EXTRA);
        assert_eq!(
            store.get_schedule(schedule.schedule_id).await.unwrap().current_number,
            CAPACITY
        );
    }

    #[tokio::test]
    async fn occupancy_stays_within_bounds_for_random_sequences() {
        let store = MemoryStore::new();
        let schedule = approved_schedule(&store, 4).await;
        let mut rng = StdRng::seed_from_u64(0x5107);
        let mut live: Vec<Uuid> = Vec::new();

        for _ in 0..500 {
            if live.is_empty() || rng.gen_bool(0.6) {
                if let Ok(b) = store.place_booking(booking_for(&schedule, Uuid::new_v4())).await {
                    live.push(b.booking_id);
                }
            } else {
                let victim = live.swap_remove(rng.gen_range(0..live.len()));
                store
                    .transition_booking(victim, BookingAction::Cancel, clinic_now())
                    .await
                    .unwrap();
            }

            let current = store.get_schedule(schedule.schedule_id).await.unwrap();
            assert!(current.current_number >= 0);
            assert!(current.current_number <= current.max_number);
            assert_eq!(current.current_number as usize, live.len());
        }
    }
}
