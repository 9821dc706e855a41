use crate::error::OfflineStoreError;
use anyhow::{Result, anyhow};
use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;

const MAX_CONNECTIONS_ENV_VAR: &str = "FEATUREFORM_OFFLINE_STORE_MAX_CONNECTIONS";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const MIN_CONNECTIONS_ENV_VAR: &str = "FEATUREFORM_OFFLINE_STORE_MIN_CONNECTIONS";
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const FETCH_SIZE_ENV_VAR: &str = "FEATUREFORM_OFFLINE_STORE_FETCH_SIZE";

/// Connection settings for the postgres offline store.
///
/// Field names follow the serialized provider config (`Host`, `Port`, ...);
/// lowercase keys are accepted as well so the same struct reads YAML files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PostgresConfig {
    #[serde(alias = "host")]
    pub host: String,
    #[serde(alias = "port", deserialize_with = "string_or_number")]
    pub port: String,
    #[serde(alias = "username")]
    pub username: String,
    #[serde(alias = "password")]
    pub password: String,
    #[serde(alias = "database")]
    pub database: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(text) => text,
        Port::Number(number) => number.to_string(),
    })
}

impl PostgresConfig {
    pub fn from_bytes(config: &[u8]) -> Result<Self> {
        serde_json::from_slice(config)
            .map_err(|e| OfflineStoreError::invalid_config(e.to_string()).into())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if self.host.is_empty() {
            return Err(OfflineStoreError::invalid_config("host is required").into());
        }
        if self.database.is_empty() {
            return Err(OfflineStoreError::invalid_config("database is required").into());
        }
        let port = if self.port.is_empty() {
            5432
        } else {
            self.port.parse::<u16>().map_err(|_| {
                OfflineStoreError::invalid_config(format!("invalid port '{}'", self.port))
            })?
        };
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(port)
            .database(&self.database);
        if !self.username.is_empty() {
            options = options.username(&self.username);
        }
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        Ok(options)
    }
}

pub struct ConnectionOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub test_before_acquire: bool,
    /// Rows pulled from a cursor per round trip.
    pub fetch_size: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout: Duration::seconds(5),
            idle_timeout: Duration::seconds(600),
            test_before_acquire: true,
            fetch_size: crate::offlinestore::iterator::DEFAULT_FETCH_SIZE,
        }
    }
}

impl ConnectionOptions {
    /// Defaults overridden by the `FEATUREFORM_OFFLINE_STORE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        fn from_env_variable<T: FromStr + ToString>(key: &str, default: T) -> Result<T> {
            std::env::var(key)
                .or_else(|_| Ok(default.to_string()))
                .and_then(|value| {
                    value
                        .parse::<T>()
                        .map_err(|_| anyhow!("Failed to parse {}", key))
                })
        }

        let defaults = Self::default();
        Ok(Self {
            max_connections: from_env_variable(MAX_CONNECTIONS_ENV_VAR, defaults.max_connections)?,
            min_connections: from_env_variable(MIN_CONNECTIONS_ENV_VAR, defaults.min_connections)?,
            fetch_size: from_env_variable(FETCH_SIZE_ENV_VAR, defaults.fetch_size)?,
            ..defaults
        })
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(
                self.acquire_timeout
                    .to_std()
                    .unwrap_or_else(|_| std::time::Duration::from_secs(0)),
            )
            .idle_timeout(
                self.idle_timeout
                    .to_std()
                    .unwrap_or_else(|_| std::time::Duration::from_secs(0)),
            )
            .test_before_acquire(self.test_before_acquire)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfflineStoreConfig {
    Postgres(PostgresConfig),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub offline_store: OfflineStoreConfig,
}

impl StoreConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Err(OfflineStoreError::invalid_config("empty configuration file").into());
        }
        let config: StoreConfig = serde_saphyr::from_str(yaml)
            .map_err(|err| OfflineStoreError::invalid_config(err.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn deserialize_provider_config() -> Result<()> {
        let config = PostgresConfig::from_bytes(
            br#"{"Host":"localhost","Port":"5432","Username":"postgres","Password":"secret","Database":"featureform"}"#,
        )?;
        assert_eq!(
            config,
            PostgresConfig {
                host: "localhost".to_string(),
                port: "5432".to_string(),
                username: "postgres".to_string(),
                password: "secret".to_string(),
                database: "featureform".to_string(),
            }
        );
        let again = PostgresConfig::from_bytes(&config.to_bytes()?)?;
        assert_eq!(again, config);
        let numeric_port = PostgresConfig::from_bytes(br#"{"host":"db","port":6543}"#)?;
        assert_eq!(numeric_port.port, "6543");
        assert!(numeric_port.password.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_config_is_invalid_config() {
        for bytes in [&b"not json"[..], &br#"{"Host": 5}"#[..]] {
            let err = PostgresConfig::from_bytes(bytes).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<OfflineStoreError>(),
                Some(OfflineStoreError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn connect_options_validate_fields() {
        let mut config = PostgresConfig {
            host: "localhost".to_string(),
            port: "not-a-port".to_string(),
            database: "featureform".to_string(),
            ..Default::default()
        };
        assert!(config.connect_options().is_err());
        config.port = "6543".to_string();
        assert!(config.connect_options().is_ok());
        config.host.clear();
        assert!(config.connect_options().is_err());
    }

    #[test]
    fn parse_yaml_store_config() -> Result<()> {
        let project_dir = env!("CARGO_MANIFEST_DIR");
        let config_path = format!("{}/test_data/offline_store.yaml", project_dir);
        let yaml_str = fs::read_to_string(config_path)?;
        let config = StoreConfig::from_yaml_str(&yaml_str)?;
        let OfflineStoreConfig::Postgres(postgres) = config.offline_store;
        assert_eq!(postgres.host, "localhost");
        assert_eq!(postgres.port, "5432");
        assert_eq!(postgres.database, "featureform");
        Ok(())
    }

    #[test]
    fn empty_yaml_is_rejected() {
        assert!(StoreConfig::from_yaml_str("  \n").is_err());
    }
}
