/// Persistence for measurements.
///
/// The anchoring engine only needs `ReadingStore::load_latest`; the rest of
/// the trait is the plain CRUD surface the HTTP layer exposes.
/// - `Database` + `repository::PgReadingStore`: PostgreSQL via sqlx
/// - `memory::MemoryReadingStore`: in-process store for tests and demos
pub mod memory;
pub mod models;
pub mod repository;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{AnchorError, Result};
use models::Reading;

/// Storage collaborator used by the service.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Check the backing store is reachable.
    async fn ping(&self) -> Result<()>;

    async fn insert(&self, reading: &Reading) -> Result<()>;

    /// Most recent readings first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<Reading>>;

    /// Latest reading for `sensor_id`, if any.
    async fn load_latest(&self, sensor_id: &str) -> Result<Option<Reading>>;

    /// Overwrite the value of every reading of `sensor_id`. Returns rows touched.
    async fn update_value(&self, sensor_id: &str, value: f64) -> Result<u64>;

    /// Remove every reading of `sensor_id`. Returns rows removed.
    async fn delete(&self, sensor_id: &str) -> Result<u64>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| AnchorError::Storage(format!("connect failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AnchorError::Storage(format!("Migration failed: {e}")))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
