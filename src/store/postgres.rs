// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Booking, BookingError, BookingStatus, DenyReason, Schedule, ScheduleStatus, SlotKey,
};
use crate::store::{BookingStore, NewBooking, NewSchedule, ScheduleStore, ScheduleWindow};
use crate::workflow::{self, ApprovalAction, BookingAction, SchedulePatch};

/* -------------------------
   DB Row Models
--------------------------*/

const SCHEDULE_COLUMNS: &str = r#"
    schedule_id, doctor_id, date, time_type, max_number, current_number, status,
    created_at, updated_at
"#;

const BOOKING_COLUMNS: &str = r#"
    booking_id, doctor_id, patient_id, date, time_type, status_id, token, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    schedule_id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    time_type: String,
    max_number: i32,
    current_number: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = BookingError;

    fn try_from(r: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Schedule {
            schedule_id: r.schedule_id,
            doctor_id: r.doctor_id,
            date: r.date,
            time_type: r.time_type.parse().map_err(corrupt_row)?,
            max_number: r.max_number,
            current_number: r.current_number,
            status: r.status.parse().map_err(corrupt_row)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    booking_id: Uuid,
    doctor_id: Uuid,
    patient_id: Uuid,
    date: NaiveDate,
    time_type: String,
    status_id: String,
    token: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = BookingError;

    fn try_from(r: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            booking_id: r.booking_id,
            doctor_id: r.doctor_id,
            patient_id: r.patient_id,
            date: r.date,
            time_type: r.time_type.parse().map_err(corrupt_row)?,
            status: BookingStatus::from_code(&r.status_id).map_err(corrupt_row)?,
            token: r.token,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

// A row that fails to decode is a storage fault, not a client error.
fn corrupt_row(e: BookingError) -> BookingError {
    BookingError::Storage(format!("row decode error: {e}"))
}

fn db_error(e: sqlx::Error) -> BookingError {
    tracing::error!(error = %e, "database error");
    BookingError::Storage(format!("db error: {e}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn schedules(rows: Vec<ScheduleRow>) -> Result<Vec<Schedule>, BookingError> {
    rows.into_iter().map(Schedule::try_from).collect()
}

fn bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, BookingError> {
    rows.into_iter().map(Booking::try_from).collect()
}

/* -------------------------
   Adapter
--------------------------*/

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, BookingError> {
        self.pool.begin().await.map_err(db_error)
    }

    async fn lock_schedule(
        tx: &mut Transaction<'static, Postgres>,
        schedule_id: Uuid,
    ) -> Result<Schedule, BookingError> {
        let row: ScheduleRow = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE schedule_id = $1 FOR UPDATE"
        ))
        .bind(schedule_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?
        .ok_or(BookingError::NotFound("schedule"))?;

        row.try_into()
    }

    async fn lock_slot(
        tx: &mut Transaction<'static, Postgres>,
        key: SlotKey,
    ) -> Result<Option<Schedule>, BookingError> {
        sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"
            SELECT {SCHEDULE_COLUMNS}
            FROM schedules
            WHERE doctor_id = $1 AND date = $2 AND time_type = $3
            FOR UPDATE
            "#
        ))
        .bind(key.doctor_id)
        .bind(key.date)
        .bind(key.time_type.code())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?
        .map(Schedule::try_from)
        .transpose()
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule, BookingError> {
        workflow::validate_capacity(new.max_number)?;

        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"
            INSERT INTO schedules (doctor_id, date, time_type, max_number, current_number, status)
            VALUES ($1, $2, $3, $4, 0, $5)
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(new.doctor_id)
        .bind(new.date)
        .bind(new.time_type.code())
        .bind(new.max_number)
        .bind(new.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::Denied(DenyReason::DuplicateSchedule)
            } else {
                db_error(e)
            }
        })?;

        row.try_into()
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Schedule, BookingError> {
        sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE schedule_id = $1"
        ))
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(BookingError::NotFound("schedule"))?
        .try_into()
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, BookingError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"
            SELECT {SCHEDULE_COLUMNS}
            FROM schedules
            ORDER BY date ASC, time_type ASC, created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        schedules(rows)
    }

    async fn list_pending_schedules(&self) -> Result<Vec<Schedule>, BookingError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"
            SELECT {SCHEDULE_COLUMNS}
            FROM schedules
            WHERE status = 'pending'
            ORDER BY date ASC, time_type ASC, created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        schedules(rows)
    }

    async fn list_doctor_schedules(
        &self,
        window: &ScheduleWindow,
    ) -> Result<Vec<Schedule>, BookingError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"
            SELECT {SCHEDULE_COLUMNS}
            FROM schedules
            WHERE doctor_id = $1
              AND date BETWEEN $2 AND $3
              AND ($4 = false OR status = 'approved')
            ORDER BY date ASC, time_type ASC
            "#
        ))
        .bind(window.doctor_id)
        .bind(window.from)
        .bind(window.to)
        .bind(window.approved_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        schedules(rows)
    }

    async fn update_schedule(
        &self,
        schedule_id: Uuid,
        patch: &SchedulePatch,
    ) -> Result<Schedule, BookingError> {
        let mut tx = self.begin().await?;
        let current = Self::lock_schedule(&mut tx, schedule_id).await?;

        workflow::can_update_schedule(&current, patch)?;
        let next = patch.apply(&current);
        if next.slot_key() != current.slot_key() {
            tracing::debug!(
                %schedule_id,
                date = %next.date,
                time_type = %next.time_type,
                "moving schedule"
            );
        }

        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"
            UPDATE schedules
            SET date = $2,
                time_type = $3,
                max_number = $4,
                status = $5,
                updated_at = now()
            WHERE schedule_id = $1
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(schedule_id)
        .bind(next.date)
        .bind(next.time_type.code())
        .bind(next.max_number)
        .bind(next.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::Denied(DenyReason::DuplicateSchedule)
            } else {
                db_error(e)
            }
        })?;

        tx.commit().await.map_err(db_error)?;
        row.try_into()
    }

    async fn decide_schedule(
        &self,
        schedule_id: Uuid,
        action: ApprovalAction,
    ) -> Result<Schedule, BookingError> {
        let mut tx = self.begin().await?;
        let current = Self::lock_schedule(&mut tx, schedule_id).await?;
        let next: ScheduleStatus = workflow::transition_schedule_approval(current.status, action)?;

        // The status predicate keeps this one-shot even without the row lock.
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"
            UPDATE schedules
            SET status = $2, updated_at = now()
            WHERE schedule_id = $1 AND status = 'pending'
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(schedule_id)
        .bind(next.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or(BookingError::Denied(DenyReason::NotPending))?;

        tx.commit().await.map_err(db_error)?;
        row.try_into()
    }

    async fn delete_schedule(&self, schedule_id: Uuid) -> Result<(), BookingError> {
        let mut tx = self.begin().await?;
        let current = Self::lock_schedule(&mut tx, schedule_id).await?;
        workflow::can_delete_schedule(&current)?;

        let res = sqlx::query(
            r#"
            DELETE FROM schedules
            WHERE schedule_id = $1 AND current_number = 0
            "#,
        )
        .bind(schedule_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if res.rows_affected() == 0 {
            return Err(DenyReason::HasActiveBookings.into());
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn place_booking(&self, new: NewBooking) -> Result<Booking, BookingError> {
        let mut tx = self.begin().await?;

        // 1) Lock the schedule row for this slot
        let schedule = Self::lock_slot(&mut tx, new.slot_key())
            .await?
            .ok_or(BookingError::NotFound("schedule"))?;

        // 2) Existing active booking for this patient on the slot
        let has_active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1 FROM bookings
              WHERE patient_id = $1 AND doctor_id = $2 AND date = $3 AND time_type = $4
                AND status_id <> 'S3'
            )
            "#,
        )
        .bind(new.patient_id)
        .bind(new.doctor_id)
        .bind(new.date)
        .bind(new.time_type.code())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        workflow::can_accept_booking(&schedule, has_active)?;

        // 3) Take one seat; zero rows means someone else got the last one
        let claimed = sqlx::query(
            r#"
            UPDATE schedules
            SET current_number = current_number + 1, updated_at = now()
            WHERE schedule_id = $1
              AND status = 'approved'
              AND current_number < max_number
            "#,
        )
        .bind(schedule.schedule_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if claimed.rows_affected() == 0 {
            return Err(DenyReason::SlotFull.into());
        }

        // 4) Insert booking
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (doctor_id, patient_id, date, time_type, status_id, token)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(new.doctor_id)
        .bind(new.patient_id)
        .bind(new.date)
        .bind(new.time_type.code())
        .bind(BookingStatus::PendingConfirmation.code())
        .bind(Uuid::new_v4())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BookingError::Denied(DenyReason::DuplicateBooking)
            } else {
                db_error(e)
            }
        })?;

        tx.commit().await.map_err(db_error)?;
        row.try_into()
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(BookingError::NotFound("booking"))?
        .try_into()
    }

    async fn list_doctor_bookings(&self, doctor_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE doctor_id = $1
            ORDER BY date ASC, time_type ASC, created_at ASC
            "#
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        bookings(rows)
    }

    async fn list_patient_bookings(&self, patient_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE patient_id = $1
            ORDER BY date ASC, time_type ASC, created_at ASC
            "#
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        bookings(rows)
    }

    async fn transition_booking(
        &self,
        booking_id: Uuid,
        action: BookingAction,
        now: DateTime<FixedOffset>,
    ) -> Result<Booking, BookingError> {
        let mut tx = self.begin().await?;

        let current: Booking = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = $1 FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or(BookingError::NotFound("booking"))?
        .try_into()?;

        let upcoming = workflow::is_upcoming(current.date, current.time_type, now);
        let transition = workflow::transition_booking_status(current.status, action, upcoming)?;

        // A schedule deleted underneath a booking has no seat left to give back.
        if transition.releases_slot() {
            if let Some(schedule) = Self::lock_slot(&mut tx, current.slot_key()).await? {
                sqlx::query(
                    r#"
                    UPDATE schedules
                    SET current_number = $2, updated_at = now()
                    WHERE schedule_id = $1
                    "#,
                )
                .bind(schedule.schedule_id)
                .bind(workflow::release_occupancy(schedule.current_number))
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            }
        }

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            UPDATE bookings
            SET status_id = $2, updated_at = now()
            WHERE booking_id = $1
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(transition.to.code())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        row.try_into()
    }

    async fn purge_cancelled_bookings(&self, cutoff: DateTime<Utc>) -> Result<u64, BookingError> {
        let res = sqlx::query(
            r#"
            DELETE FROM bookings
            WHERE status_id = 'S3' AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(res.rows_affected())
    }
}
