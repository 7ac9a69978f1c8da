/// Database models for eco-anchor.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored sensor measurement.
///
/// Only `sensor_id` and `value` feed the fingerprint; `created_at` orders
/// readings so verification picks the latest one.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub value: f64,
    pub created_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(sensor_id: impl Into<String>, value: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            value,
            created_at: Utc::now(),
        }
    }
}
