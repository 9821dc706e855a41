//! Forward-only iterators over materialization and training set rows.
//!
//! Rows come from a [`RowSource`]; for postgres that is a server-side cursor
//! opened inside a read-only `REPEATABLE READ` transaction and read in
//! batches, so a scan sees one snapshot and never holds more than a batch in
//! memory. The source is closed as soon as the iterator stops, whether it ran
//! out of rows or failed.

use crate::error::OfflineStoreError;
use crate::model::ResourceRecord;
use crate::sql;
use crate::value::{ScalarValue, decode};
use anyhow::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::collections::VecDeque;
use std::marker::PhantomData;
use tracing::debug;

pub const DEFAULT_FETCH_SIZE: u32 = 1024;

const CURSOR_NAME: &str = "featureform_rows";

#[async_trait]
pub trait RowSource: Send {
    type Row: Send;

    /// Next raw row, or `None` once the source is drained.
    async fn fetch_next(&mut self) -> Result<Option<Self::Row>>;

    /// Releases the backend resources held by the source.
    async fn close(&mut self) -> Result<()>;
}

/// Raw materialization row: `entity, value, ts`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatureRow {
    pub entity: String,
    pub value: Option<JsonValue>,
    pub ts: DateTime<Utc>,
}

impl RawFeatureRow {
    fn into_record(self) -> Result<ResourceRecord> {
        let Self { entity, value, ts } = self;
        Ok(ResourceRecord {
            entity,
            value: decode_column(value)?,
            ts,
        })
    }
}

impl FromRow<'_, PgRow> for RawFeatureRow {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let entity: String = row.try_get("entity")?;
        let value: Option<JsonValue> = row.try_get("value")?;
        let ts: DateTime<Utc> = row.try_get("ts")?;
        Ok(Self { entity, value, ts })
    }
}

/// Raw training set row: one envelope per column, the label last.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrainingRow(pub Vec<Option<JsonValue>>);

impl FromRow<'_, PgRow> for RawTrainingRow {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        (0..row.len())
            .map(|i| row.try_get::<Option<JsonValue>, _>(i))
            .collect::<sqlx::Result<Vec<_>>>()
            .map(Self)
    }
}

fn decode_column(value: Option<JsonValue>) -> Result<ScalarValue> {
    match value {
        None => Ok(ScalarValue::Null),
        Some(document) => decode(document),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Exhausted,
    Failed,
}

struct RowStream<R: Send> {
    source: Box<dyn RowSource<Row = R>>,
    state: StreamState,
    err: Option<Error>,
}

impl<R: Send> RowStream<R> {
    fn new(source: Box<dyn RowSource<Row = R>>) -> Self {
        Self {
            source,
            state: StreamState::Open,
            err: None,
        }
    }

    async fn advance(&mut self) -> Option<R> {
        if self.state != StreamState::Open {
            return None;
        }
        match self.source.fetch_next().await {
            Ok(Some(row)) => Some(row),
            Ok(None) => {
                self.finish(None).await;
                None
            }
            Err(err) => {
                self.finish(Some(err)).await;
                None
            }
        }
    }

    async fn fail(&mut self, err: Error) {
        if self.state == StreamState::Open {
            self.finish(Some(err)).await;
        }
    }

    async fn finish(&mut self, err: Option<Error>) {
        let closed = self.source.close().await;
        self.err = err.or(closed.err());
        self.state = if self.err.is_some() {
            StreamState::Failed
        } else {
            StreamState::Exhausted
        };
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == StreamState::Open {
            self.state = StreamState::Exhausted;
            self.source.close().await?;
        }
        Ok(())
    }
}

/// Iterates the records of one materialization segment.
pub struct FeatureIterator {
    stream: RowStream<RawFeatureRow>,
    current: Option<ResourceRecord>,
}

impl FeatureIterator {
    pub fn new(source: Box<dyn RowSource<Row = RawFeatureRow>>) -> Self {
        Self {
            stream: RowStream::new(source),
            current: None,
        }
    }

    /// Advances to the next record. Returns false at the end of the stream or
    /// on error; check [`FeatureIterator::err`] to tell them apart.
    pub async fn next(&mut self) -> bool {
        self.current = None;
        let Some(raw) = self.stream.advance().await else {
            return false;
        };
        match raw.into_record() {
            Ok(record) => {
                self.current = Some(record);
                true
            }
            Err(err) => {
                self.stream.fail(err).await;
                false
            }
        }
    }

    pub fn value(&self) -> Option<&ResourceRecord> {
        self.current.as_ref()
    }

    pub fn err(&self) -> Option<&Error> {
        self.stream.err.as_ref()
    }

    pub async fn close(&mut self) -> Result<()> {
        self.current = None;
        self.stream.close().await
    }
}

/// Iterates training set rows as ordered feature values plus a label.
pub struct TrainingSetIterator {
    stream: RowStream<RawTrainingRow>,
    current_features: Vec<ScalarValue>,
    current_label: Option<ScalarValue>,
}

impl TrainingSetIterator {
    pub fn new(source: Box<dyn RowSource<Row = RawTrainingRow>>) -> Self {
        Self {
            stream: RowStream::new(source),
            current_features: Vec::new(),
            current_label: None,
        }
    }

    pub async fn next(&mut self) -> bool {
        self.current_features.clear();
        self.current_label = None;
        let Some(RawTrainingRow(mut columns)) = self.stream.advance().await else {
            return false;
        };
        let Some(label) = columns.pop() else {
            self.stream
                .fail(OfflineStoreError::codec("training set row has no label column").into())
                .await;
            return false;
        };
        let decoded = columns
            .into_iter()
            .map(decode_column)
            .collect::<Result<Vec<_>>>()
            .and_then(|features| Ok((features, decode_column(label)?)));
        match decoded {
            Ok((features, label)) => {
                self.current_features = features;
                self.current_label = Some(label);
                true
            }
            Err(err) => {
                self.stream.fail(err).await;
                false
            }
        }
    }

    /// Feature values of the current row, in training set column order.
    pub fn features(&self) -> &[ScalarValue] {
        &self.current_features
    }

    pub fn label(&self) -> Option<&ScalarValue> {
        self.current_label.as_ref()
    }

    pub fn err(&self) -> Option<&Error> {
        self.stream.err.as_ref()
    }

    pub async fn close(&mut self) -> Result<()> {
        self.current_features.clear();
        self.current_label = None;
        self.stream.close().await
    }
}

/// Server-side cursor over a query, read `FETCH FORWARD` batch by batch.
///
/// Dropping an open cursor rolls its transaction back when the connection
/// returns to the pool.
pub(crate) struct PgCursor<R> {
    tx: Option<Transaction<'static, Postgres>>,
    fetch_query: String,
    fetch_size: u32,
    buffer: VecDeque<R>,
    drained: bool,
    _row: PhantomData<fn() -> R>,
}

impl<R> PgCursor<R>
where
    R: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    pub(crate) async fn open(
        pool: &PgPool,
        query: &str,
        params: &[i64],
        fetch_size: u32,
    ) -> Result<Self> {
        let mut tx = pool.begin().await?;
        sqlx::query(sql::SNAPSHOT_TRANSACTION)
            .execute(&mut *tx)
            .await?;
        let declare = sql::declare_cursor(CURSOR_NAME, query);
        debug!("Open cursor: {}", declare);
        let mut statement = sqlx::query(&declare).persistent(false);
        for param in params {
            statement = statement.bind(*param);
        }
        statement.execute(&mut *tx).await?;
        Ok(Self {
            tx: Some(tx),
            fetch_query: sql::fetch_forward(CURSOR_NAME, fetch_size.max(1)),
            fetch_size: fetch_size.max(1),
            buffer: VecDeque::new(),
            drained: false,
            _row: PhantomData,
        })
    }
}

#[async_trait]
impl<R> RowSource for PgCursor<R>
where
    R: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    type Row = R;

    async fn fetch_next(&mut self) -> Result<Option<R>> {
        if self.buffer.is_empty() && !self.drained {
            let Some(tx) = self.tx.as_mut() else {
                return Ok(None);
            };
            let rows = sqlx::query(&self.fetch_query)
                .persistent(false)
                .fetch_all(&mut **tx)
                .await?;
            self.drained = rows.len() < self.fetch_size as usize;
            for row in &rows {
                self.buffer.push_back(R::from_row(row)?);
            }
        }
        Ok(self.buffer.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        self.drained = true;
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }
}
