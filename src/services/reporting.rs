use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::booking::{DisplayStatus, MealSlot, MealStatus, SlotMap};
use crate::services::bookings::BookingStore;

/// Warden-facing display status, derived at read time. Never fed back into
/// the store.
pub fn derive_display_status(raw: MealStatus, consumed: bool, past_date: bool) -> DisplayStatus {
    match raw {
        MealStatus::Cancelled | MealStatus::Skipped if consumed => DisplayStatus::CancelledConsumed,
        MealStatus::Cancelled | MealStatus::Skipped => DisplayStatus::Cancelled,
        MealStatus::Confirmed if !consumed && past_date => DisplayStatus::Missed,
        MealStatus::Confirmed => DisplayStatus::Confirmed,
        _ => DisplayStatus::Other,
    }
}

/// Query params for GET /reports/student-meal-status.
#[derive(Debug, Deserialize)]
pub struct StudentMealStatusQuery {
    pub hostel_id: Uuid,
    pub date: NaiveDate,
    pub slot: Option<MealSlot>,
    pub status: Option<DisplayStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub sort: SortKey,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    StudentName,
    BookingNumber,
}

#[derive(Debug, Serialize)]
pub struct StudentMealStatusRow {
    pub student_id: Uuid,
    pub student_name: String,
    pub booking_number: i64,
    pub slot: MealSlot,
    pub raw_status: MealStatus,
    pub display_status: DisplayStatus,
    pub consumed: bool,
}

pub struct ReportingService;

impl ReportingService {
    /// Per-slot status counts for one hostel+date.
    pub async fn meal_analytics(
        pool: &PgPool,
        hostel_id: Uuid,
        date: NaiveDate,
        today: NaiveDate,
    ) -> anyhow::Result<Value> {
        let records = BookingStore::get_all_for_hostel_and_date(pool, hostel_id, date).await?;
        let past_date = date < today;

        let counts = SlotMap::from_fn(|slot| {
            let mut confirmed = 0u32;
            let mut cancelled = 0u32;
            let mut cancelled_consumed = 0u32;
            let mut missed = 0u32;
            let mut other = 0u32;
            for record in &records {
                let state = record.meals.get(slot);
                match derive_display_status(state.status, state.consumed, past_date) {
                    DisplayStatus::Confirmed => confirmed += 1,
                    DisplayStatus::Cancelled => cancelled += 1,
                    DisplayStatus::CancelledConsumed => cancelled_consumed += 1,
                    DisplayStatus::Missed => missed += 1,
                    DisplayStatus::Other => other += 1,
                }
            }
            json!({
                "confirmed": confirmed,
                "cancelled": cancelled,
                "cancelled_consumed": cancelled_consumed,
                "missed": missed,
                "other": other,
            })
        });

        Ok(json!({
            "date": date,
            "total_records": records.len(),
            "slots": counts,
        }))
    }

    /// Warden listing with filter, sort and pagination. The display status is
    /// derived in memory, so filtering happens after the (hostel, date) fetch.
    pub async fn student_meal_status(
        pool: &PgPool,
        query: &StudentMealStatusQuery,
        today: NaiveDate,
    ) -> anyhow::Result<Value> {
        let records =
            BookingStore::get_all_for_hostel_and_date(pool, query.hostel_id, query.date).await?;
        let past_date = query.date < today;

        let student_ids: Vec<Uuid> = records.iter().map(|r| r.student_id).collect();
        let names: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT id, name FROM students WHERE id = ANY($1)",
        )
        .bind(&student_ids)
        .fetch_all(pool)
        .await?;
        let names: std::collections::HashMap<Uuid, String> = names.into_iter().collect();

        let slots: Vec<MealSlot> = match query.slot {
            Some(slot) => vec![slot],
            None => MealSlot::ALL.to_vec(),
        };

        let mut rows: Vec<StudentMealStatusRow> = Vec::new();
        for record in &records {
            for slot in &slots {
                let state = record.meals.get(*slot);
                let display = derive_display_status(state.status, state.consumed, past_date);
                if let Some(wanted) = query.status {
                    if display != wanted {
                        continue;
                    }
                }
                rows.push(StudentMealStatusRow {
                    student_id: record.student_id,
                    student_name: names
                        .get(&record.student_id)
                        .cloned()
                        .unwrap_or_default(),
                    booking_number: record.booking_number,
                    slot: *slot,
                    raw_status: state.status,
                    display_status: display,
                    consumed: state.consumed,
                });
            }
        }

        match query.sort {
            SortKey::StudentName => {
                rows.sort_by(|a, b| a.student_name.cmp(&b.student_name).then(a.slot.cmp(&b.slot)))
            }
            SortKey::BookingNumber => rows.sort_by(|a, b| {
                a.booking_number.cmp(&b.booking_number).then(a.slot.cmp(&b.slot))
            }),
        }

        let total = rows.len();
        let per_page = query.per_page.max(1) as usize;
        let page = query.page.max(1) as usize;
        let paged: Vec<_> = rows
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(json!({
            "total": total,
            "page": page,
            "per_page": per_page,
            "rows": paged,
        }))
    }

    /// One student's month of bookings with derived per-slot display statuses.
    pub async fn monthly_calendar(
        pool: &PgPool,
        hostel_id: Uuid,
        student_id: Uuid,
        month_start: NaiveDate,
        today: NaiveDate,
    ) -> anyhow::Result<Value> {
        let month_end = (month_start + chrono::Duration::days(32))
            .with_day0(0)
            .map(|d| d - chrono::Duration::days(1))
            .unwrap_or(month_start);

        let records =
            BookingStore::get_range(pool, hostel_id, student_id, month_start, month_end).await?;

        let days: Vec<Value> = records
            .iter()
            .map(|record| {
                let past_date = record.date < today;
                let statuses = SlotMap::from_fn(|slot| {
                    let state = record.meals.get(slot);
                    json!({
                        "status": state.status,
                        "display": derive_display_status(state.status, state.consumed, past_date),
                        "locked": state.locked,
                        "consumed": state.consumed,
                    })
                });
                json!({
                    "date": record.date,
                    "booking_number": record.booking_number,
                    "meals": statuses,
                })
            })
            .collect();

        Ok(json!({ "month_start": month_start, "days": days }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_and_consumed_projects_cancelled_consumed() {
        let d = derive_display_status(MealStatus::Skipped, true, true);
        assert_eq!(d, DisplayStatus::CancelledConsumed);
        let d = derive_display_status(MealStatus::Cancelled, true, false);
        assert_eq!(d, DisplayStatus::CancelledConsumed);
    }

    #[test]
    fn cancelled_without_consumption_projects_cancelled() {
        assert_eq!(
            derive_display_status(MealStatus::Skipped, false, false),
            DisplayStatus::Cancelled
        );
        assert_eq!(
            derive_display_status(MealStatus::Cancelled, false, true),
            DisplayStatus::Cancelled
        );
    }

    #[test]
    fn confirmed_past_unconsumed_is_missed() {
        assert_eq!(
            derive_display_status(MealStatus::Confirmed, false, true),
            DisplayStatus::Missed
        );
    }

    #[test]
    fn confirmed_otherwise_stays_confirmed() {
        assert_eq!(
            derive_display_status(MealStatus::Confirmed, false, false),
            DisplayStatus::Confirmed
        );
        // Consumed + past: not missed
        assert_eq!(
            derive_display_status(MealStatus::Confirmed, true, true),
            DisplayStatus::Confirmed
        );
    }

    #[test]
    fn pending_and_not_applicable_are_other() {
        assert_eq!(
            derive_display_status(MealStatus::Pending, false, false),
            DisplayStatus::Other
        );
        assert_eq!(
            derive_display_status(MealStatus::NotApplicable, false, true),
            DisplayStatus::Other
        );
    }
}
