use crate::config::{ConnectionOptions, PostgresConfig};
use crate::error::OfflineStoreError;
use crate::model::{MaterializationId, ResourceId, ResourceRecord, ResourceType, TrainingSetDef};
use crate::naming;
use crate::offlinestore::iterator::{
    FeatureIterator, PgCursor, RawFeatureRow, RawTrainingRow, TrainingSetIterator,
};
use crate::offlinestore::{Materialization, OfflineStore, OfflineTable};
use crate::sql;
use crate::value;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, info};

/// SQLSTATE raised when `CREATE TABLE` hits an existing relation.
const DUPLICATE_TABLE: &str = "42P07";

fn is_duplicate_table(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(DUPLICATE_TABLE)
    )
}

/// Offline store backed by PostgreSQL tables.
///
/// All components share the pool handed to the store; nothing here keeps
/// global connection state.
pub struct PostgresOfflineStore {
    pool: PgPool,
    fetch_size: u32,
}

impl PostgresOfflineStore {
    pub fn new(pool: PgPool, fetch_size: u32) -> Self {
        Self { pool, fetch_size }
    }

    pub async fn from_options(
        config: &PostgresConfig,
        connection_options: ConnectionOptions,
    ) -> Result<Self> {
        let connect_options = config.connect_options()?;
        let pool = connection_options
            .pool_options()
            .connect_with(connect_options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to postgres at {}:{}/{}",
                    config.host, config.port, config.database
                )
            })?;
        Ok(Self::new(pool, connection_options.fetch_size))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(sql::TABLE_EXISTS)
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn existing_resource_table(&self, id: &ResourceId) -> Result<PostgresOfflineTable> {
        let name = naming::resource_table_name(id)?;
        if !self.table_exists(&name).await? {
            return Err(OfflineStoreError::table_not_found(&id.name, &id.variant).into());
        }
        Ok(PostgresOfflineTable {
            pool: self.pool.clone(),
            name,
        })
    }
}

#[async_trait]
impl OfflineStore for PostgresOfflineStore {
    async fn create_resource_table(&self, id: &ResourceId) -> Result<Box<dyn OfflineTable>> {
        let name = naming::resource_table_name(id)?;
        if self.table_exists(&name).await? {
            return Err(OfflineStoreError::table_already_exists(&id.name, &id.variant).into());
        }
        let query = sql::create_resource_table(&name);
        debug!("Create resource table: {}", query);
        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => {}
            Err(err) if is_duplicate_table(&err) => {
                return Err(OfflineStoreError::table_already_exists(&id.name, &id.variant).into());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to create table {}", name));
            }
        }
        Ok(Box::new(PostgresOfflineTable {
            pool: self.pool.clone(),
            name,
        }))
    }

    async fn get_resource_table(&self, id: &ResourceId) -> Result<Box<dyn OfflineTable>> {
        let table = self.existing_resource_table(id).await?;
        Ok(Box::new(table))
    }

    async fn resource_table_exists(&self, id: &ResourceId) -> Result<bool> {
        let name = naming::resource_table_name(id)?;
        self.table_exists(&name).await
    }

    async fn create_materialization(&self, id: &ResourceId) -> Result<Box<dyn Materialization>> {
        id.check(&[ResourceType::Feature])?;
        let source = self.existing_resource_table(id).await?;
        let materialization_id = MaterializationId::from(id);
        let table_name = naming::materialization_table_name(&materialization_id)?;

        // Create, clear and refill in one transaction so readers never see a
        // half-built snapshot. Rebuilds of the same table are serialized by
        // the build lock.
        let mut tx = self.pool.begin().await?;
        sqlx::query(sql::LOCK_TABLE_BUILD)
            .bind(&table_name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to lock materialization {}", table_name))?;
        sqlx::query(&sql::create_materialization_table(&table_name, &source.name))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create materialization {}", table_name))?;
        sqlx::query(&sql::clear_table(&table_name))
            .execute(&mut *tx)
            .await?;
        let inserted = sqlx::query(&sql::materialize_latest(&table_name, &source.name))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to materialize {}", source.name))?
            .rows_affected();
        tx.commit().await?;
        info!(
            "Materialized {} entities from {} into {}",
            inserted, source.name, table_name
        );

        Ok(Box::new(PostgresMaterialization {
            id: materialization_id,
            pool: self.pool.clone(),
            table_name,
            fetch_size: self.fetch_size,
        }))
    }

    async fn get_materialization(
        &self,
        id: &MaterializationId,
    ) -> Result<Box<dyn Materialization>> {
        let table_name = naming::materialization_table_name(id)?;
        if !self.table_exists(&table_name).await? {
            return Err(OfflineStoreError::materialization_not_found(id.as_str()).into());
        }
        Ok(Box::new(PostgresMaterialization {
            id: id.clone(),
            pool: self.pool.clone(),
            table_name,
            fetch_size: self.fetch_size,
        }))
    }

    /// Builds the training set table. Unlike materializations, an existing
    /// training set is never rebuilt.
    async fn create_training_set(&self, def: &TrainingSetDef) -> Result<()> {
        def.check()?;
        let table_name = naming::training_set_table_name(&def.id)?;
        let label = self.existing_resource_table(&def.label).await?;
        let mut features = Vec::with_capacity(def.features.len());
        for feature in &def.features {
            features.push(self.existing_resource_table(feature).await?.name);
        }
        if self.table_exists(&table_name).await? {
            return Err(
                OfflineStoreError::table_already_exists(&def.id.name, &def.id.variant).into(),
            );
        }

        let query = sql::create_training_set(&table_name, &label.name, &features);
        debug!("Create training set: {}", query);
        match sqlx::query(&query).execute(&self.pool).await {
            Ok(result) => {
                info!(
                    "Created training set {} with {} rows and {} features",
                    table_name,
                    result.rows_affected(),
                    features.len()
                );
                Ok(())
            }
            Err(err) if is_duplicate_table(&err) => {
                Err(OfflineStoreError::table_already_exists(&def.id.name, &def.id.variant).into())
            }
            Err(err) => {
                Err(err).with_context(|| format!("Failed to create training set {}", table_name))
            }
        }
    }

    async fn get_training_set(&self, id: &ResourceId) -> Result<TrainingSetIterator> {
        let table_name = naming::training_set_table_name(id)?;
        if !self.table_exists(&table_name).await? {
            return Err(OfflineStoreError::training_set_not_found(&id.name, &id.variant).into());
        }
        let columns: Vec<String> = sqlx::query_scalar(sql::TABLE_COLUMNS)
            .bind(&table_name)
            .fetch_all(&self.pool)
            .await?;
        let query = sql::select_columns(&table_name, &columns);
        let cursor =
            PgCursor::<RawTrainingRow>::open(&self.pool, &query, &[], self.fetch_size).await?;
        Ok(TrainingSetIterator::new(Box::new(cursor)))
    }
}

pub struct PostgresOfflineTable {
    pool: PgPool,
    name: String,
}

#[async_trait]
impl OfflineTable for PostgresOfflineTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, record: &ResourceRecord) -> Result<()> {
        record.check()?;
        let envelope = value::encode(&record.value)?;
        sqlx::query(&sql::upsert_record(&self.name))
            .bind(&record.entity)
            .bind(Json(&envelope))
            .bind(record.ts)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to write record to {}", self.name))?;
        Ok(())
    }
}

pub struct PostgresMaterialization {
    id: MaterializationId,
    pool: PgPool,
    table_name: String,
    fetch_size: u32,
}

#[async_trait]
impl Materialization for PostgresMaterialization {
    fn id(&self) -> &MaterializationId {
        &self.id
    }

    async fn num_rows(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&sql::count_rows(&self.table_name))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Positions are numbered by entity over the whole snapshot when the
    /// segment is opened. Each segment reads a consistent snapshot; a
    /// rebuild between two segments can shift positions.
    async fn iterate_segment(&self, start: i64, end: i64) -> Result<FeatureIterator> {
        if start < 0 || end < start {
            return Err(OfflineStoreError::InvalidSegment { start, end }.into());
        }
        let query = sql::materialization_segment(&self.table_name);
        let cursor =
            PgCursor::<RawFeatureRow>::open(&self.pool, &query, &[start, end], self.fetch_size)
                .await?;
        Ok(FeatureIterator::new(Box::new(cursor)))
    }
}
