#![allow(dead_code)]

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};
use offline_store_core::config::{ConnectionOptions, PostgresConfig};
use offline_store_core::error::OfflineStoreError;
use offline_store_core::offlinestore::iterator::FeatureIterator;
use offline_store_core::offlinestore::postgres::PostgresOfflineStore;
use offline_store_core::model::ResourceRecord;
use std::sync::atomic::{AtomicUsize, Ordering};

static NAME_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn test_config() -> PostgresConfig {
    PostgresConfig {
        host: env_or("OFFLINE_STORE_TEST_HOST", "localhost"),
        port: env_or("OFFLINE_STORE_TEST_PORT", "5432"),
        username: env_or("OFFLINE_STORE_TEST_USERNAME", "postgres"),
        password: env_or("OFFLINE_STORE_TEST_PASSWORD", "password"),
        database: env_or("OFFLINE_STORE_TEST_DATABASE", "postgres"),
    }
}

pub async fn store() -> Result<PostgresOfflineStore> {
    let options = ConnectionOptions {
        fetch_size: 2,
        ..ConnectionOptions::default()
    };
    PostgresOfflineStore::from_options(&test_config(), options).await
}

/// Resource name no other test run has used, so tests never share tables.
pub fn unique_name(prefix: &str) -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}_{}_{}", prefix, Utc::now().timestamp_micros(), n)
}

pub fn at_hour(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

pub fn store_error(err: &anyhow::Error) -> Option<&OfflineStoreError> {
    err.downcast_ref::<OfflineStoreError>()
}

pub async fn drain(mut iter: FeatureIterator) -> Result<Vec<ResourceRecord>> {
    let mut records = Vec::new();
    while iter.next().await {
        let record = iter
            .value()
            .cloned()
            .ok_or_else(|| anyhow!("next() returned true without a value"))?;
        records.push(record);
    }
    if let Some(err) = iter.err() {
        return Err(anyhow!("iteration failed: {:?}", err));
    }
    Ok(records)
}
