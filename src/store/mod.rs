mod connect;
mod mongo;

pub use connect::LazyConnection;
pub use mongo::{ConnectionManager, MongoReadingStore};

use time::OffsetDateTime;

/// One persisted anomaly record reported by a smart meter.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub meter_id: String,
    pub time: OffsetDateTime,
    pub anomalous_power_reading: f64,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("storage write error: {0}")]
    Write(String),
    #[error("storage read error: {0}")]
    Read(String),
}

#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist one reading. No retry; the caller surfaces the failure.
    async fn insert(&self, reading: Reading) -> Result<(), StoreError>;

    /// Return every stored reading in the store's natural order.
    async fn list_all(&self) -> Result<Vec<Reading>, StoreError>;
}
