use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::booking::{
    BookingRow, MealBookingRecord, MealSlot, SlotMap, SlotRow, SlotState,
};

/// Durable per-(hostel, student, date) booking records. All mutating
/// statements are conditional filter+update pairs so concurrent sweeps and
/// student submissions converge without explicit locking.
pub struct BookingStore;

/// Group flat slot rows by booking id, each into its four-slot map.
fn group_slot_rows(slot_rows: Vec<SlotRow>) -> HashMap<Uuid, SlotMap<SlotState>> {
    let mut by_booking: HashMap<Uuid, SlotMap<SlotState>> = HashMap::new();
    for slot_row in slot_rows {
        let entry = by_booking.entry(slot_row.booking_id).or_default();
        let slot = slot_row.slot;
        *entry.get_mut(slot) = slot_row.into_state();
    }
    by_booking
}

impl BookingStore {
    pub async fn get(
        pool: &PgPool,
        hostel_id: Uuid,
        student_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<Option<MealBookingRecord>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT id, hostel_id, student_id, date, menu_id, booking_number,
                    is_manual_booking, created_by, updated_by, created_at, updated_at
             FROM meal_bookings
             WHERE hostel_id = $1 AND student_id = $2 AND date = $3",
        )
        .bind(hostel_id)
        .bind(student_id)
        .bind(date)
        .fetch_all(pool)
        .await?;

        Ok(Self::assemble(pool, rows).await?.into_iter().next())
    }

    pub async fn get_range(
        pool: &PgPool,
        hostel_id: Uuid,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<MealBookingRecord>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT id, hostel_id, student_id, date, menu_id, booking_number,
                    is_manual_booking, created_by, updated_by, created_at, updated_at
             FROM meal_bookings
             WHERE hostel_id = $1 AND student_id = $2 AND date BETWEEN $3 AND $4
             ORDER BY date",
        )
        .bind(hostel_id)
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        Self::assemble(pool, rows).await
    }

    pub async fn get_all_for_hostel_and_date(
        pool: &PgPool,
        hostel_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<MealBookingRecord>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT id, hostel_id, student_id, date, menu_id, booking_number,
                    is_manual_booking, created_by, updated_by, created_at, updated_at
             FROM meal_bookings
             WHERE hostel_id = $1 AND date = $2
             ORDER BY booking_number",
        )
        .bind(hostel_id)
        .bind(date)
        .fetch_all(pool)
        .await?;

        Self::assemble(pool, rows).await
    }

    /// Join header rows with their slot rows in one extra round trip.
    async fn assemble(
        pool: &PgPool,
        rows: Vec<BookingRow>,
    ) -> anyhow::Result<Vec<MealBookingRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let slot_rows = sqlx::query_as::<_, SlotRow>(
            "SELECT booking_id, slot, status, locked, consumed, consumed_at, cancel_source
             FROM meal_booking_slots WHERE booking_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        let mut by_booking = group_slot_rows(slot_rows);

        Ok(rows
            .into_iter()
            .map(|r| {
                let meals = by_booking.remove(&r.id).unwrap_or_default();
                MealBookingRecord {
                    id: r.id,
                    hostel_id: r.hostel_id,
                    student_id: r.student_id,
                    date: r.date,
                    menu_id: r.menu_id,
                    booking_number: r.booking_number,
                    is_manual_booking: r.is_manual_booking,
                    meals,
                    created_by: r.created_by,
                    updated_by: r.updated_by,
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                }
            })
            .collect())
    }

    /// Insert a new record with all four slot states. The booking number comes
    /// from the sequence, keeping it monotone under concurrent submissions.
    pub async fn insert_record(
        tx: &mut Transaction<'_, Postgres>,
        hostel_id: Uuid,
        student_id: Uuid,
        date: NaiveDate,
        menu_id: Option<Uuid>,
        slots: &SlotMap<SlotState>,
        is_manual: bool,
        actor: &str,
    ) -> anyhow::Result<Uuid> {
        let booking_id: Uuid = sqlx::query_scalar(
            "INSERT INTO meal_bookings
                 (hostel_id, student_id, date, menu_id, is_manual_booking, created_by, updated_by)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING id",
        )
        .bind(hostel_id)
        .bind(student_id)
        .bind(date)
        .bind(menu_id)
        .bind(is_manual)
        .bind(actor)
        .fetch_one(&mut **tx)
        .await?;

        for slot in MealSlot::ALL {
            let state = slots.get(slot);
            sqlx::query(
                "INSERT INTO meal_booking_slots
                     (booking_id, slot, status, locked, consumed, consumed_at, cancel_source)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(booking_id)
            .bind(slot)
            .bind(state.status)
            .bind(state.locked)
            .bind(state.consumed)
            .bind(state.consumed_at)
            .bind(state.cancel_source)
            .execute(&mut **tx)
            .await?;
        }

        Ok(booking_id)
    }

    /// Guarded slot write: applies only while the slot is still unlocked, so
    /// a sweep racing this update wins and the student write becomes a no-op.
    pub async fn update_slot_guarded(
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        slot: MealSlot,
        state: &SlotState,
        actor: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE meal_booking_slots
             SET status = $3, locked = $4, consumed = $5, consumed_at = $6, cancel_source = $7
             WHERE booking_id = $1 AND slot = $2 AND locked = FALSE",
        )
        .bind(booking_id)
        .bind(slot)
        .bind(state.status)
        .bind(state.locked)
        .bind(state.consumed)
        .bind(state.consumed_at)
        .bind(state.cancel_source)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() > 0 {
            sqlx::query(
                "UPDATE meal_bookings SET updated_by = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(booking_id)
            .bind(actor)
            .execute(&mut **tx)
            .await?;
        }

        Ok(result.rows_affected() > 0)
    }

    /// Promote still-PENDING slots to CONFIRMED for a hostel+date+slot.
    /// Idempotent: the status filter makes a re-run a no-op.
    pub async fn promote_pending(
        tx: &mut Transaction<'_, Postgres>,
        hostel_id: Uuid,
        date: NaiveDate,
        slot: MealSlot,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE meal_booking_slots s
             SET status = 'confirmed'
             FROM meal_bookings b
             WHERE s.booking_id = b.id
               AND b.hostel_id = $1 AND b.date = $2
               AND s.slot = $3 AND s.status = 'pending' AND s.locked = FALSE",
        )
        .bind(hostel_id)
        .bind(date)
        .bind(slot)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// One bounded chunk of the hourly lock sweep for a (hostel, date, slot)
    /// triple. Returns how many slots were locked; callers loop until zero.
    /// The locked/status filter makes re-running the sweep a no-op.
    pub async fn lock_slots_chunk(
        pool: &PgPool,
        hostel_id: Uuid,
        date: NaiveDate,
        slot: MealSlot,
        chunk_size: i64,
    ) -> anyhow::Result<u64> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT s.booking_id
             FROM meal_booking_slots s
             JOIN meal_bookings b ON b.id = s.booking_id
             WHERE b.hostel_id = $1 AND b.date = $2 AND s.slot = $3
               AND s.locked = FALSE AND s.status IN ('pending', 'confirmed')
             LIMIT $4",
        )
        .bind(hostel_id)
        .bind(date)
        .bind(slot)
        .bind(chunk_size)
        .fetch_all(pool)
        .await?;

        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE meal_booking_slots
             SET locked = TRUE
             WHERE booking_id = ANY($1) AND slot = $2
               AND locked = FALSE AND status IN ('pending', 'confirmed')",
        )
        .bind(&ids)
        .bind(slot)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::MealStatus;

    fn slot_row(booking_id: Uuid, slot: MealSlot, status: MealStatus, locked: bool) -> SlotRow {
        SlotRow {
            booking_id,
            slot,
            status,
            locked,
            consumed: false,
            consumed_at: None,
            cancel_source: None,
        }
    }

    #[test]
    fn slot_rows_land_under_their_own_slot() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = vec![
            slot_row(a, MealSlot::Breakfast, MealStatus::Confirmed, false),
            slot_row(a, MealSlot::Dinner, MealStatus::NotApplicable, true),
            slot_row(b, MealSlot::Lunch, MealStatus::Skipped, false),
        ];

        let grouped = group_slot_rows(rows);
        assert_eq!(grouped.len(), 2);

        let meals_a = &grouped[&a];
        assert_eq!(meals_a.breakfast.status, MealStatus::Confirmed);
        assert_eq!(meals_a.dinner.status, MealStatus::NotApplicable);
        assert!(meals_a.dinner.locked);
        // Rows without a stored slot row fall back to the pending default
        assert_eq!(meals_a.lunch.status, MealStatus::Pending);

        let meals_b = &grouped[&b];
        assert_eq!(meals_b.lunch.status, MealStatus::Skipped);
    }
}
