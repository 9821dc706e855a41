pub mod iterator;
pub mod postgres;

use crate::config::{ConnectionOptions, OfflineStoreConfig, PostgresConfig};
use crate::model::{MaterializationId, ResourceId, ResourceRecord, TrainingSetDef};
use crate::offlinestore::iterator::{FeatureIterator, TrainingSetIterator};
use crate::offlinestore::postgres::PostgresOfflineStore;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Entity/value/timestamp storage for one feature or label.
#[async_trait]
pub trait OfflineTable: Send + Sync {
    /// Physical table name.
    fn name(&self) -> &str;

    /// Upserts `record` keyed on `(entity, ts)`.
    async fn write(&self, record: &ResourceRecord) -> Result<()>;
}

/// Latest-value-per-entity snapshot of a feature.
#[async_trait]
pub trait Materialization: Send + Sync {
    fn id(&self) -> &MaterializationId;

    async fn num_rows(&self) -> Result<i64>;

    /// Rows at 1-based positions `start < position <= end`.
    async fn iterate_segment(&self, start: i64, end: i64) -> Result<FeatureIterator>;
}

#[async_trait]
pub trait OfflineStore: Send + Sync + 'static {
    async fn create_resource_table(&self, id: &ResourceId) -> Result<Box<dyn OfflineTable>>;

    async fn get_resource_table(&self, id: &ResourceId) -> Result<Box<dyn OfflineTable>>;

    async fn resource_table_exists(&self, id: &ResourceId) -> Result<bool>;

    async fn create_materialization(&self, id: &ResourceId) -> Result<Box<dyn Materialization>>;

    async fn get_materialization(&self, id: &MaterializationId)
    -> Result<Box<dyn Materialization>>;

    async fn create_training_set(&self, def: &TrainingSetDef) -> Result<()>;

    async fn get_training_set(&self, id: &ResourceId) -> Result<TrainingSetIterator>;
}

pub async fn get_offline_store(config: &OfflineStoreConfig) -> Result<Arc<dyn OfflineStore>> {
    match config {
        OfflineStoreConfig::Postgres(postgres) => {
            debug!(
                "Create Postgres offline store for {}:{}/{}",
                postgres.host, postgres.port, postgres.database
            );
            PostgresOfflineStore::from_options(postgres, ConnectionOptions::from_env()?)
                .await
                .map(|store| Arc::new(store) as Arc<dyn OfflineStore>)
        }
    }
}

/// Provider factory: builds a postgres offline store from a serialized
/// [`PostgresConfig`]. Malformed bytes fail with `InvalidConfig` before any
/// connection is attempted.
pub async fn postgres_offline_store_factory(config: &[u8]) -> Result<Arc<dyn OfflineStore>> {
    let postgres = PostgresConfig::from_bytes(config)?;
    get_offline_store(&OfflineStoreConfig::Postgres(postgres)).await
}
