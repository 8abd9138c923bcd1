use std::sync::Arc;
use std::time::Duration;

use bson::doc;
use futures::TryStreamExt;
use mongodb::{options::ClientOptions, Client, Database};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::timeout;

use super::{connect::LazyConnection, Reading, ReadingStore, StoreError};
use crate::config::MongoConfig;

/// Owns the lazily established link to the backing MongoDB database.
///
/// The handle is created on first use and reused for the life of the
/// process; the driver pools connections internally behind it.
pub struct ConnectionManager {
    cfg: MongoConfig,
    conn: LazyConnection<Database>,
}

impl ConnectionManager {
    pub fn new(cfg: MongoConfig) -> Self {
        Self {
            cfg,
            conn: LazyConnection::new(),
        }
    }

    /// Returns the database handle, connecting on the first call.
    pub async fn database(&self) -> Result<&Database, StoreError> {
        self.conn.get_or_connect(|| self.open()).await
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    async fn open(&self) -> Result<Database, StoreError> {
        let connect_timeout = Duration::from_millis(self.cfg.connect_timeout_ms);

        let mut options = ClientOptions::parse(&self.cfg.uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        options.app_name = self.cfg.app_name.clone();
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(connect_timeout);

        let client = Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;
        let db = client.database(&self.cfg.database);

        // The client connects lazily; ping so a bad address fails here
        // rather than on the first write.
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(database = %self.cfg.database, "connected to MongoDB");
        Ok(db)
    }
}

/// Persisted document shape; keeps the camelCase keys of the original
/// collection so existing data stays readable.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingDocument {
    meter_id: String,
    #[serde(with = "bson::serde_helpers::time_0_3_offsetdatetime_as_bson_datetime")]
    time: OffsetDateTime,
    anomalous_power_reading: f64,
}

impl From<Reading> for ReadingDocument {
    fn from(r: Reading) -> Self {
        Self {
            meter_id: r.meter_id,
            time: r.time,
            anomalous_power_reading: r.anomalous_power_reading,
        }
    }
}

impl From<ReadingDocument> for Reading {
    fn from(d: ReadingDocument) -> Self {
        Self {
            meter_id: d.meter_id,
            time: d.time,
            anomalous_power_reading: d.anomalous_power_reading,
        }
    }
}

pub struct MongoReadingStore {
    manager: Arc<ConnectionManager>,
    collection: String,
    op_timeout: Duration,
}

impl MongoReadingStore {
    pub fn new(manager: Arc<ConnectionManager>, collection: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            manager,
            collection: collection.into(),
            op_timeout,
        }
    }

    fn collection(&self, db: &Database) -> mongodb::Collection<ReadingDocument> {
        db.collection::<ReadingDocument>(&self.collection)
    }
}

#[async_trait::async_trait]
impl ReadingStore for MongoReadingStore {
    async fn insert(&self, reading: Reading) -> Result<(), StoreError> {
        let db = self.manager.database().await?;
        let coll = self.collection(db);

        timeout(self.op_timeout, coll.insert_one(ReadingDocument::from(reading)))
            .await
            .map_err(|_| StoreError::Write("insert timed out".to_string()))?
            .map_err(|e| {
                metrics::counter!("store_write_errors_total").increment(1);
                StoreError::Write(e.to_string())
            })?;

        metrics::counter!("readings_inserted_total").increment(1);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Reading>, StoreError> {
        let db = self.manager.database().await?;
        let coll = self.collection(db);

        let cursor = timeout(self.op_timeout, coll.find(doc! {}))
            .await
            .map_err(|_| StoreError::Read("find timed out".to_string()))?
            .map_err(|e| {
                metrics::counter!("store_read_errors_total").increment(1);
                StoreError::Read(e.to_string())
            })?;

        let docs: Vec<ReadingDocument> = timeout(self.op_timeout, cursor.try_collect())
            .await
            .map_err(|_| StoreError::Read("cursor drain timed out".to_string()))?
            .map_err(|e| {
                metrics::counter!("store_read_errors_total").increment(1);
                StoreError::Read(e.to_string())
            })?;

        Ok(docs.into_iter().map(Reading::from).collect())
    }
}
