/// In-process `ReadingStore`.
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::Reading;
use super::ReadingStore;
use crate::error::Result;

#[derive(Default)]
pub struct MemoryReadingStore {
    rows: RwLock<Vec<Reading>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, reading: &Reading) -> Result<()> {
        self.rows.write().await.push(reading.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Reading>> {
        let mut rows = self.rows.read().await.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn load_latest(&self, sensor_id: &str) -> Result<Option<Reading>> {
        // max_by_key keeps the last maximum, so ties resolve to the latest insert.
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn update_value(&self, sensor_id: &str, value: f64) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut touched = 0;
        for row in rows.iter_mut().filter(|r| r.sensor_id == sensor_id) {
            row.value = value;
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete(&self, sensor_id: &str) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.sensor_id != sensor_id);
        Ok((before - rows.len()) as u64)
    }
}
