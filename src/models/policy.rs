use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::booking::{MealSlot, SlotMap};

/// Booking/cancellation cutoff for one meal slot: `day_offset` days relative
/// to the meal's own date, at `time` of day (hostel-local).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealCutoff {
    pub day_offset: i32,
    pub time: NaiveTime,
}

/// Serving window for one meal slot, used for display and leave-overlap checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Per-hostel cutoff overrides; `None` for a slot means the system default
/// applies. Absence of a policy is the normal case, not an error.
#[derive(Debug, Clone, Default)]
pub struct HostelPolicy {
    pub cutoffs: SlotMap<Option<MealCutoff>>,
}

#[derive(Debug, Clone, Default)]
pub struct HostelMealTiming {
    pub windows: SlotMap<Option<MealWindow>>,
}

fn hm(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap()
}

/// The single system-default cutoff table. Both the foreground validator path
/// and the background jobs resolve through this, so the defaults cannot drift.
pub fn default_cutoff(slot: MealSlot) -> MealCutoff {
    match slot {
        MealSlot::Breakfast => MealCutoff { day_offset: -1, time: hm(21, 0) },
        MealSlot::Lunch => MealCutoff { day_offset: 0, time: hm(8, 0) },
        MealSlot::Snacks => MealCutoff { day_offset: 0, time: hm(13, 0) },
        MealSlot::Dinner => MealCutoff { day_offset: 0, time: hm(16, 0) },
    }
}

pub fn default_window(slot: MealSlot) -> MealWindow {
    match slot {
        MealSlot::Breakfast => MealWindow { start: hm(7, 30), end: hm(9, 0) },
        MealSlot::Lunch => MealWindow { start: hm(12, 30), end: hm(14, 0) },
        MealSlot::Snacks => MealWindow { start: hm(17, 0), end: hm(17, 45) },
        MealSlot::Dinner => MealWindow { start: hm(19, 30), end: hm(21, 0) },
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CutoffRow {
    pub slot: MealSlot,
    pub day_offset: i32,
    pub cutoff_time: NaiveTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct TimingRow {
    pub slot: MealSlot,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Body for PUT /hostels/{id}/meal-cutoffs; slots left null keep the default.
#[derive(Debug, Deserialize)]
pub struct SetCutoffsRequest {
    pub cutoffs: SlotMap<Option<MealCutoff>>,
}

/// Body for PUT /hostels/{id}/meal-timings.
#[derive(Debug, Deserialize)]
pub struct SetTimingsRequest {
    pub windows: SlotMap<Option<MealWindow>>,
}
