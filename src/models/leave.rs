use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An approved leave range, owned by the leave subsystem. The engine only
/// reads ranges overlapping a candidate date.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApprovedLeave {
    pub student_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ApprovedLeave {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}
