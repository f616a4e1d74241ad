use sqlx::PgPool;
use uuid::Uuid;

/// Read-only contract against the student/hostel directory.
pub struct DirectoryService;

impl DirectoryService {
    pub async fn active_hostels(pool: &PgPool) -> anyhow::Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT id FROM hostels WHERE is_active = TRUE ORDER BY id")
            .fetch_all(pool)
            .await?;
        Ok(ids)
    }

    pub async fn active_students(pool: &PgPool, hostel_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM students WHERE hostel_id = $1 AND is_active = TRUE ORDER BY id",
        )
        .bind(hostel_id)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }
}
