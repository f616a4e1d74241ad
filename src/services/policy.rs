use chrono::{Duration, NaiveDate, NaiveDateTime};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::booking::{MealSlot, SlotMap};
use crate::models::policy::{
    default_cutoff, default_window, CutoffRow, HostelMealTiming, HostelPolicy, MealCutoff,
    MealWindow, SetCutoffsRequest, SetTimingsRequest, TimingRow,
};

/// The hostel's stored override if present, else the system default.
pub fn resolve_cutoff(policy: &HostelPolicy, slot: MealSlot) -> MealCutoff {
    (*policy.cutoffs.get(slot)).unwrap_or_else(|| default_cutoff(slot))
}

pub fn resolve_meal_window(timing: &HostelMealTiming, slot: MealSlot) -> MealWindow {
    (*timing.windows.get(slot)).unwrap_or_else(|| default_window(slot))
}

/// The instant (hostel-local) after which a slot's transitions are
/// cutoff-gated: the meal's date shifted by `day_offset` days, at the
/// cutoff's time of day.
pub fn cutoff_instant(date: NaiveDate, cutoff: &MealCutoff) -> NaiveDateTime {
    (date + Duration::days(cutoff.day_offset as i64)).and_time(cutoff.time)
}

pub struct PolicyService;

impl PolicyService {
    pub async fn load_cutoffs(pool: &PgPool, hostel_id: Uuid) -> anyhow::Result<HostelPolicy> {
        let rows = sqlx::query_as::<_, CutoffRow>(
            "SELECT slot, day_offset, cutoff_time
             FROM hostel_meal_cutoffs WHERE hostel_id = $1",
        )
        .bind(hostel_id)
        .fetch_all(pool)
        .await?;

        let mut policy = HostelPolicy::default();
        for row in rows {
            *policy.cutoffs.get_mut(row.slot) = Some(MealCutoff {
                day_offset: row.day_offset,
                time: row.cutoff_time,
            });
        }
        Ok(policy)
    }

    pub async fn load_timings(pool: &PgPool, hostel_id: Uuid) -> anyhow::Result<HostelMealTiming> {
        let rows = sqlx::query_as::<_, TimingRow>(
            "SELECT slot, start_time, end_time
             FROM hostel_meal_timings WHERE hostel_id = $1",
        )
        .bind(hostel_id)
        .fetch_all(pool)
        .await?;

        let mut timing = HostelMealTiming::default();
        for row in rows {
            *timing.windows.get_mut(row.slot) = Some(MealWindow {
                start: row.start_time,
                end: row.end_time,
            });
        }
        Ok(timing)
    }

    /// Upsert overrides for the slots given; slots left null are cleared so
    /// the system default applies again.
    pub async fn set_cutoffs(
        pool: &PgPool,
        hostel_id: Uuid,
        req: &SetCutoffsRequest,
    ) -> anyhow::Result<()> {
        for slot in MealSlot::ALL {
            match req.cutoffs.get(slot) {
                Some(cutoff) => {
                    sqlx::query(
                        "INSERT INTO hostel_meal_cutoffs (hostel_id, slot, day_offset, cutoff_time)
                         VALUES ($1, $2, $3, $4)
                         ON CONFLICT (hostel_id, slot) DO UPDATE SET
                             day_offset = EXCLUDED.day_offset,
                             cutoff_time = EXCLUDED.cutoff_time",
                    )
                    .bind(hostel_id)
                    .bind(slot)
                    .bind(cutoff.day_offset)
                    .bind(cutoff.time)
                    .execute(pool)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "DELETE FROM hostel_meal_cutoffs WHERE hostel_id = $1 AND slot = $2",
                    )
                    .bind(hostel_id)
                    .bind(slot)
                    .execute(pool)
                    .await?;
                }
            }
        }
        Ok(())
    }

    pub async fn set_timings(
        pool: &PgPool,
        hostel_id: Uuid,
        req: &SetTimingsRequest,
    ) -> anyhow::Result<()> {
        for slot in MealSlot::ALL {
            match req.windows.get(slot) {
                Some(window) => {
                    sqlx::query(
                        "INSERT INTO hostel_meal_timings (hostel_id, slot, start_time, end_time)
                         VALUES ($1, $2, $3, $4)
                         ON CONFLICT (hostel_id, slot) DO UPDATE SET
                             start_time = EXCLUDED.start_time,
                             end_time = EXCLUDED.end_time",
                    )
                    .bind(hostel_id)
                    .bind(slot)
                    .bind(window.start)
                    .bind(window.end)
                    .execute(pool)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "DELETE FROM hostel_meal_timings WHERE hostel_id = $1 AND slot = $2",
                    )
                    .bind(hostel_id)
                    .bind(slot)
                    .execute(pool)
                    .await?;
                }
            }
        }
        Ok(())
    }

    /// Resolved cutoffs for all four slots (override or default), for display.
    pub fn resolved_cutoffs(policy: &HostelPolicy) -> SlotMap<MealCutoff> {
        SlotMap::from_fn(|slot| resolve_cutoff(policy, slot))
    }

    pub fn resolved_windows(timing: &HostelMealTiming) -> SlotMap<MealWindow> {
        SlotMap::from_fn(|slot| resolve_meal_window(timing, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn defaults_apply_when_no_override() {
        let policy = HostelPolicy::default();
        let lunch = resolve_cutoff(&policy, MealSlot::Lunch);
        assert_eq!(lunch.day_offset, 0);
        assert_eq!(lunch.time, t(8, 0));

        let breakfast = resolve_cutoff(&policy, MealSlot::Breakfast);
        assert_eq!(breakfast.day_offset, -1);
        assert_eq!(breakfast.time, t(21, 0));
    }

    #[test]
    fn override_wins_over_default() {
        let mut policy = HostelPolicy::default();
        policy.cutoffs.dinner = Some(MealCutoff { day_offset: 0, time: t(18, 30) });

        assert_eq!(resolve_cutoff(&policy, MealSlot::Dinner).time, t(18, 30));
        // Other slots still fall back
        assert_eq!(resolve_cutoff(&policy, MealSlot::Snacks).time, t(13, 0));
    }

    #[test]
    fn breakfast_cutoff_lands_on_previous_day() {
        let policy = HostelPolicy::default();
        let cutoff = resolve_cutoff(&policy, MealSlot::Breakfast);
        let instant = cutoff_instant(d(2026, 3, 10), &cutoff);
        assert_eq!(instant, d(2026, 3, 9).and_time(t(21, 0)));
    }

    #[test]
    fn same_day_cutoff_instant() {
        let cutoff = MealCutoff { day_offset: 0, time: t(8, 0) };
        let instant = cutoff_instant(d(2026, 3, 10), &cutoff);
        assert_eq!(instant, d(2026, 3, 10).and_time(t(8, 0)));
    }
}
