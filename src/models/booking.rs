use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The four daily meal slots every hostel serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Snacks,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 4] = [
        MealSlot::Breakfast,
        MealSlot::Lunch,
        MealSlot::Snacks,
        MealSlot::Dinner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Snacks => "snacks",
            MealSlot::Dinner => "dinner",
        }
    }
}

/// Raw stored status of one meal slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum MealStatus {
    Pending,
    Confirmed,
    Skipped,
    Cancelled,
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum CancelSource {
    Leave,
    Manual,
}

/// Why a requested transition was rejected. Carried as data in the response,
/// never thrown; the Display form is the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("no menu item exists for this slot")]
    NoMenuItem,
    #[error("the date is already in the past")]
    PastDate,
    #[error("the slot is locked")]
    Locked,
    #[error("the booking cutoff has passed")]
    CutoffPassed,
    #[error("an approved leave covers this date")]
    Leave,
}

/// Warden-facing derived status; computed at read time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayStatus {
    Confirmed,
    Cancelled,
    #[serde(rename = "Cancelled-Consumed")]
    CancelledConsumed,
    Missed,
    Other,
}

/// A fixed-shape map from meal slot to a value; keeps the four slots explicit
/// in JSON (`{"breakfast": ..., "lunch": ..., ...}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMap<T> {
    pub breakfast: T,
    pub lunch: T,
    pub snacks: T,
    pub dinner: T,
}

impl<T> SlotMap<T> {
    pub fn get(&self, slot: MealSlot) -> &T {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Snacks => &self.snacks,
            MealSlot::Dinner => &self.dinner,
        }
    }

    pub fn get_mut(&mut self, slot: MealSlot) -> &mut T {
        match slot {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::Snacks => &mut self.snacks,
            MealSlot::Dinner => &mut self.dinner,
        }
    }

    pub fn from_fn(mut f: impl FnMut(MealSlot) -> T) -> Self {
        Self {
            breakfast: f(MealSlot::Breakfast),
            lunch: f(MealSlot::Lunch),
            snacks: f(MealSlot::Snacks),
            dinner: f(MealSlot::Dinner),
        }
    }
}

/// Stored state of one meal slot within a booking record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    pub status: MealStatus,
    pub locked: bool,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub cancel_source: Option<CancelSource>,
}

impl SlotState {
    pub fn new(status: MealStatus) -> Self {
        Self {
            status,
            locked: false,
            consumed: false,
            consumed_at: None,
            cancel_source: None,
        }
    }

    /// A slot with no menu item: permanently locked, never bookable.
    pub fn not_applicable() -> Self {
        Self {
            status: MealStatus::NotApplicable,
            locked: true,
            consumed: false,
            consumed_at: None,
            cancel_source: None,
        }
    }
}

impl Default for SlotState {
    fn default() -> Self {
        Self::new(MealStatus::Pending)
    }
}

/// One booking record per (hostel, student, date), assembled from its header
/// row and four slot rows. Never hard-deleted.
#[derive(Debug, Clone, Serialize)]
pub struct MealBookingRecord {
    pub id: Uuid,
    pub hostel_id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub menu_id: Option<Uuid>,
    pub booking_number: i64,
    pub is_manual_booking: bool,
    pub meals: SlotMap<SlotState>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BookingRow {
    pub id: Uuid,
    pub hostel_id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub menu_id: Option<Uuid>,
    pub booking_number: i64,
    pub is_manual_booking: bool,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SlotRow {
    pub booking_id: Uuid,
    pub slot: MealSlot,
    pub status: MealStatus,
    pub locked: bool,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub cancel_source: Option<CancelSource>,
}

impl SlotRow {
    pub fn into_state(self) -> SlotState {
        SlotState {
            status: self.status,
            locked: self.locked,
            consumed: self.consumed,
            consumed_at: self.consumed_at,
            cancel_source: self.cancel_source,
        }
    }
}

/// Body for POST /bookings/bulk.
#[derive(Debug, Deserialize)]
pub struct BulkBookingRequest {
    pub hostel_id: Uuid,
    pub student_id: Uuid,
    pub requests: Vec<DateMealsRequest>,
}

/// One date's worth of requested transitions. Slots left out are untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct DateMealsRequest {
    pub date: NaiveDate,
    pub meals: SlotMap<Option<MealStatus>>,
}

/// Outcome of one requested slot transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotResult {
    pub accepted: bool,
    pub status: MealStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateResult {
    pub date: NaiveDate,
    pub slots: SlotMap<Option<SlotResult>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BookingSummary {
    pub confirmed: u32,
    pub rejected: u32,
    pub cancelled: u32,
}

/// Response for POST /bookings/bulk. Reflects exactly what was persisted:
/// the whole batch commits or rolls back as one transaction.
#[derive(Debug, Serialize)]
pub struct BookingSubmission {
    pub per_date_results: Vec<DateResult>,
    pub summary: BookingSummary,
}
