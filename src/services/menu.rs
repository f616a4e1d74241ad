use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::menu::DailyMenu;

/// Read-only contract against the menu subsystem. Menu content creation is
/// owned elsewhere; the engine only needs existence and per-slot content.
pub struct MenuService;

impl MenuService {
    pub async fn menu_for_date(
        pool: &PgPool,
        hostel_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<Option<DailyMenu>> {
        let menu = sqlx::query_as::<_, DailyMenu>(
            "SELECT id, hostel_id, date, breakfast, lunch, snacks, dinner
             FROM daily_menus WHERE hostel_id = $1 AND date = $2",
        )
        .bind(hostel_id)
        .bind(date)
        .fetch_optional(pool)
        .await?;
        Ok(menu)
    }

    pub async fn menus_for_range(
        pool: &PgPool,
        hostel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<DailyMenu>> {
        let menus = sqlx::query_as::<_, DailyMenu>(
            "SELECT id, hostel_id, date, breakfast, lunch, snacks, dinner
             FROM daily_menus WHERE hostel_id = $1 AND date BETWEEN $2 AND $3
             ORDER BY date",
        )
        .bind(hostel_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;
        Ok(menus)
    }
}
