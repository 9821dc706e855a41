use crate::cli_options::{CliCommand, CliOptions, NameVariant, ResourceKind};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::Parser;
use offline_store_core::config::StoreConfig;
use offline_store_core::model::{MaterializationId, ResourceId, ResourceRecord, TrainingSetDef};
use offline_store_core::offlinestore::{OfflineStore, get_offline_store};
use offline_store_core::value::ScalarValue;
use serde_json::json;
use std::fs;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli_options;

const CONFIG_PATH_ENV_VAR: &str = "OFFLINE_STORE_CONFIG_PATH";
const DEFAULT_CONFIG_FILE_NAME: &str = "offline_store.yaml";

fn resource_id(name: String, variant: String, kind: ResourceKind) -> ResourceId {
    match kind {
        ResourceKind::Feature => ResourceId::feature(name, variant),
        ResourceKind::Label => ResourceId::label(name, variant),
    }
}

fn parse_ts(ts: Option<String>) -> Result<DateTime<Utc>> {
    match ts {
        Some(ts) => Ok(DateTime::parse_from_rfc3339(&ts)
            .with_context(|| format!("Invalid timestamp '{}'", ts))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// End of an open-ended read: the last row, or an empty segment when `start`
/// is already past it.
fn default_segment_end(start: i64, num_rows: i64) -> i64 {
    num_rows.max(start)
}

async fn run(store: &dyn OfflineStore, command: CliCommand) -> Result<()> {
    match command {
        CliCommand::CreateResource { resource, kind } => {
            let id = resource_id(resource.name, resource.variant, kind);
            let table = store.create_resource_table(&id).await?;
            tracing::info!("Created resource table {}", table.name());
        }
        CliCommand::Write {
            resource,
            kind,
            entity,
            value,
            value_type,
            ts,
        } => {
            let id = resource_id(resource.name, resource.variant, kind);
            let record = ResourceRecord::new(
                entity,
                ScalarValue::parse(&value_type, &value)?,
                parse_ts(ts)?,
            );
            store.get_resource_table(&id).await?.write(&record).await?;
        }
        CliCommand::Materialize { resource } => {
            let id = ResourceId::feature(resource.name, resource.variant);
            let materialization = store.create_materialization(&id).await?;
            tracing::info!(
                "Materialization {} holds {} rows",
                materialization.id(),
                materialization.num_rows().await?
            );
        }
        CliCommand::ReadMaterialization { id, start, end } => {
            let materialization = store
                .get_materialization(&MaterializationId::from(id))
                .await?;
            let end = match end {
                Some(end) => end,
                None => default_segment_end(start, materialization.num_rows().await?),
            };
            let mut iter = materialization.iterate_segment(start, end).await?;
            while iter.next().await {
                if let Some(record) = iter.value() {
                    println!(
                        "{}",
                        json!({
                            "entity": record.entity,
                            "value": record.value,
                            "ts": record.ts.to_rfc3339(),
                        })
                    );
                }
            }
            if let Some(err) = iter.err() {
                return Err(anyhow!("Reading materialization failed: {:#}", err));
            }
            iter.close().await?;
        }
        CliCommand::CreateTrainingSet {
            resource,
            label,
            features,
        } => {
            let NameVariant { name, variant } = label;
            let def = TrainingSetDef {
                id: ResourceId::training_set(resource.name, resource.variant),
                label: ResourceId::label(name, variant),
                features: features
                    .into_iter()
                    .map(|f| ResourceId::feature(f.name, f.variant))
                    .collect(),
            };
            store.create_training_set(&def).await?;
        }
        CliCommand::ReadTrainingSet { resource } => {
            let id = ResourceId::training_set(resource.name, resource.variant);
            let mut iter = store.get_training_set(&id).await?;
            while iter.next().await {
                println!(
                    "{}",
                    json!({
                        "features": iter.features(),
                        "label": iter.label(),
                    })
                );
            }
            if let Some(err) = iter.err() {
                return Err(anyhow!("Reading training set failed: {:#}", err));
            }
            iter.close().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let CliOptions {
        config,
        log_level,
        command,
    } = CliOptions::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::from(log_level).into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = config
        .or(std::env::var(CONFIG_PATH_ENV_VAR).ok())
        .unwrap_or(DEFAULT_CONFIG_FILE_NAME.to_string());
    let yaml_str = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file {}", config_path))?;
    let store_config = StoreConfig::from_yaml_str(&yaml_str)?;
    let store = get_offline_store(&store_config.offline_store).await?;
    run(store.as_ref(), command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_ended_read_past_the_end_is_empty_segment() {
        assert_eq!(default_segment_end(0, 10), 10);
        assert_eq!(default_segment_end(4, 10), 10);
        assert_eq!(default_segment_end(25, 10), 25);
    }

    #[test]
    fn parses_timestamps_as_utc() -> Result<()> {
        let ts = parse_ts(Some("2024-01-01T02:00:00+02:00".to_string()))?;
        assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert!(parse_ts(Some("yesterday".to_string())).is_err());
        Ok(())
    }
}
