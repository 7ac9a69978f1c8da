/// PostgreSQL measurement repository.
///
/// All queries use sqlx runtime-checked queries (not compile-time checked)
/// to avoid requiring a live database during development builds.
use async_trait::async_trait;

use super::models::Reading;
use super::{Database, ReadingStore};
use crate::error::{AnchorError, Result};

fn db_err(e: sqlx::Error) -> AnchorError {
    AnchorError::Storage(e.to_string())
}

/// `ReadingStore` over the `measurements` table.
#[derive(Clone)]
pub struct PgReadingStore {
    db: Database,
}

impl PgReadingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.db.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert(&self, reading: &Reading) -> Result<()> {
        sqlx::query("INSERT INTO measurements (sensor_id, value, created_at) VALUES ($1, $2, $3)")
            .bind(&reading.sensor_id)
            .bind(reading.value)
            .bind(reading.created_at)
            .execute(self.db.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Reading>> {
        sqlx::query_as::<_, Reading>(
            "SELECT sensor_id, value, created_at FROM measurements ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)
    }

    async fn load_latest(&self, sensor_id: &str) -> Result<Option<Reading>> {
        sqlx::query_as::<_, Reading>(
            r#"
            SELECT sensor_id, value, created_at FROM measurements
            WHERE sensor_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)
    }

    async fn update_value(&self, sensor_id: &str, value: f64) -> Result<u64> {
        let done = sqlx::query("UPDATE measurements SET value = $1 WHERE sensor_id = $2")
            .bind(value)
            .bind(sensor_id)
            .execute(self.db.pool())
            .await
            .map_err(db_err)?;
        Ok(done.rows_affected())
    }

    async fn delete(&self, sensor_id: &str) -> Result<u64> {
        let done = sqlx::query("DELETE FROM measurements WHERE sensor_id = $1")
            .bind(sensor_id)
            .execute(self.db.pool())
            .await
            .map_err(db_err)?;
        Ok(done.rows_affected())
    }
}
