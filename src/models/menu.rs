use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::booking::MealSlot;

/// One hostel's menu for one date, owned by the menu subsystem. An empty
/// string in a slot column means no menu item exists for that slot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyMenu {
    pub id: Uuid,
    pub hostel_id: Uuid,
    pub date: NaiveDate,
    pub breakfast: String,
    pub lunch: String,
    pub snacks: String,
    pub dinner: String,
}

impl DailyMenu {
    pub fn content(&self, slot: MealSlot) -> &str {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Snacks => &self.snacks,
            MealSlot::Dinner => &self.dinner,
        }
    }

    pub fn has_item(&self, slot: MealSlot) -> bool {
        !self.content(slot).trim().is_empty()
    }
}
