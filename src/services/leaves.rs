use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::leave::ApprovedLeave;

/// Read-only contract against the leave subsystem.
pub struct LeaveService;

impl LeaveService {
    /// All approved leaves for the given students overlapping [from, to].
    pub async fn approved_overlapping(
        pool: &PgPool,
        student_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<ApprovedLeave>> {
        if student_ids.is_empty() {
            return Ok(Vec::new());
        }
        let leaves = sqlx::query_as::<_, ApprovedLeave>(
            "SELECT student_id, start_date, end_date
             FROM approved_leaves
             WHERE student_id = ANY($1) AND status = 'approved'
               AND start_date <= $3 AND end_date >= $2",
        )
        .bind(student_ids)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;
        Ok(leaves)
    }
}
