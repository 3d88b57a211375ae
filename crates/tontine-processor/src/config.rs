//! Configuration management
//!
//! Settings come from an optional YAML file and from `TONTINE_*` environment
//! variables. Environment variables take precedence over the file.
//!
//! ```yaml
//! chain_id: 2
//! indexer_endpoint: "https://grpc.testnet.aptoslabs.com:443"
//! indexer_transport: grpc
//! indexer_api_key: "aptoslabs_..."
//! starting_version: 0
//! db_connection_uri: "postgresql://localhost/tontine"
//! tontine_module_address: "0x81e2e2499407693c81fe65c86405ca70df529438339d9da7a6fc2520142b591e"
//! tontine_module_name: "tontine07"
//! api_port: 8080
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tontine_common::normalize_address;

use crate::db::DbConfig;
use crate::ingest::{ContractTarget, ProcessorConfig, StartingVersionConfig};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Prefix of every environment variable read by [`Config::load`].
pub const ENV_PREFIX: &str = "TONTINE_";

/// Default checkpoint row name.
pub const DEFAULT_INDEXER_NAME: &str = "tontine_processor";

/// Default API host binding.
pub const DEFAULT_API_HOST: &str = "127.0.0.1";

/// Default maximum database connections in the pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default CORS allowed origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

/// Wire protocol spoken by the indexer endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerTransport {
    /// Server-streaming `GetTransactions` call.
    #[default]
    Grpc,
    /// Newline-delimited JSON batches from a POST.
    Http,
}

impl FromStr for IndexerTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grpc" => Ok(IndexerTransport::Grpc),
            "http" | "ndjson" => Ok(IndexerTransport::Http),
            other => Err(format!("unknown transport '{}', expected grpc or http", other)),
        }
    }
}

/// Processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain_id: u64,
    pub indexer: IndexerConfig,
    pub database: DatabaseConfig,
    pub contract: ContractConfig,
    pub api: ApiConfig,
    pub run_processor: bool,
}

/// Upstream transaction stream settings
#[derive(Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub endpoint: String,
    pub transport: IndexerTransport,
    pub api_key: String,
    /// Sent upstream as the request name and used as the checkpoint key.
    pub name: String,
    /// Start here when no checkpoint exists.
    pub starting_version: Option<u64>,
    /// Start here even when a checkpoint exists.
    pub starting_version_override: Option<u64>,
}

impl std::fmt::Debug for IndexerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerConfig")
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport)
            .field("api_key", &"<redacted>")
            .field("name", &self.name)
            .field("starting_version", &self.starting_version)
            .field("starting_version_override", &self.starting_version_override)
            .finish()
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_uri: String,
    pub max_connections: u32,
}

/// The on-chain module to index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Normalized to a `0x` prefix at load time.
    pub module_address: String,
    pub module_name: String,
}

/// Query API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    /// The API is only served when a port is configured.
    pub port: Option<u16>,
    pub cors_allowed_origins: Vec<String>,
}

/// Flat file layout; every field can also be set through the environment.
#[derive(Debug, Default, Clone, Deserialize)]
struct RawConfig {
    chain_id: Option<u64>,
    indexer_endpoint: Option<String>,
    indexer_transport: Option<IndexerTransport>,
    indexer_api_key: Option<String>,
    indexer_name: Option<String>,
    starting_version: Option<u64>,
    starting_version_override: Option<u64>,
    db_connection_uri: Option<String>,
    db_max_connections: Option<u32>,
    tontine_module_address: Option<String>,
    tontine_module_name: Option<String>,
    api_host: Option<String>,
    api_port: Option<u16>,
    run_processor: Option<bool>,
    cors_allowed_origins: Option<Vec<String>>,
}

impl RawConfig {
    fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        // An empty file parses as YAML null.
        let raw: Option<RawConfig> =
            serde_yaml::from_str(contents).context("Failed to parse YAML configuration")?;
        Ok(raw.unwrap_or_default())
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        override_parsed(&mut self.chain_id, "CHAIN_ID")?;
        override_string(&mut self.indexer_endpoint, "INDEXER_ENDPOINT");
        override_parsed(&mut self.indexer_transport, "INDEXER_TRANSPORT")?;
        override_string(&mut self.indexer_api_key, "INDEXER_API_KEY");
        override_string(&mut self.indexer_name, "INDEXER_NAME");
        override_parsed(&mut self.starting_version, "STARTING_VERSION")?;
        override_parsed(&mut self.starting_version_override, "STARTING_VERSION_OVERRIDE")?;
        override_string(&mut self.db_connection_uri, "DB_CONNECTION_URI");
        override_parsed(&mut self.db_max_connections, "DB_MAX_CONNECTIONS")?;
        override_string(&mut self.tontine_module_address, "MODULE_ADDRESS");
        override_string(&mut self.tontine_module_name, "MODULE_NAME");
        override_string(&mut self.api_host, "API_HOST");
        override_parsed(&mut self.api_port, "API_PORT")?;
        override_parsed(&mut self.run_processor, "RUN_PROCESSOR")?;

        if let Some(origins) = env_value("CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        Ok(())
    }
}

fn env_value(suffix: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, suffix))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn override_string(field: &mut Option<String>, suffix: &str) {
    if let Some(value) = env_value(suffix) {
        *field = Some(value);
    }
}

fn override_parsed<T>(field: &mut Option<T>, suffix: &str) -> anyhow::Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = env_value(suffix) {
        let parsed = value.trim().parse::<T>().map_err(|e| {
            anyhow::anyhow!("Invalid value '{}' for {}{}: {}", value, ENV_PREFIX, suffix, e)
        })?;
        *field = Some(parsed);
    }
    Ok(())
}

fn required<T>(value: Option<T>, field: &str, env_suffix: &str) -> anyhow::Result<T> {
    value.ok_or_else(|| {
        anyhow::anyhow!(
            "Missing required setting '{}' (config file) or {}{} (environment)",
            field,
            ENV_PREFIX,
            env_suffix
        )
    })
}

impl Config {
    /// Load configuration from an optional YAML file and the environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut raw = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                RawConfig::from_yaml(&contents)?
            },
            None => RawConfig::default(),
        };
        raw.apply_env()?;

        let config = Self::from_raw(raw)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML document without consulting the environment
    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config = Self::from_raw(RawConfig::from_yaml(contents)?)?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> anyhow::Result<Self> {
        Ok(Config {
            chain_id: required(raw.chain_id, "chain_id", "CHAIN_ID")?,
            indexer: IndexerConfig {
                endpoint: required(raw.indexer_endpoint, "indexer_endpoint", "INDEXER_ENDPOINT")?,
                transport: raw.indexer_transport.unwrap_or_default(),
                api_key: required(raw.indexer_api_key, "indexer_api_key", "INDEXER_API_KEY")?,
                name: raw
                    .indexer_name
                    .unwrap_or_else(|| DEFAULT_INDEXER_NAME.to_string()),
                starting_version: raw.starting_version,
                starting_version_override: raw.starting_version_override,
            },
            database: DatabaseConfig {
                connection_uri: required(
                    raw.db_connection_uri,
                    "db_connection_uri",
                    "DB_CONNECTION_URI",
                )?,
                max_connections: raw.db_max_connections.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            },
            contract: ContractConfig {
                module_address: normalize_address(&required(
                    raw.tontine_module_address,
                    "tontine_module_address",
                    "MODULE_ADDRESS",
                )?),
                module_name: required(raw.tontine_module_name, "tontine_module_name", "MODULE_NAME")?,
            },
            api: ApiConfig {
                host: raw.api_host.unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
                port: raw.api_port,
                cors_allowed_origins: raw
                    .cors_allowed_origins
                    .unwrap_or_else(|| vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()]),
            },
            run_processor: raw.run_processor.unwrap_or(true),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let required_strings = [
            ("indexer_endpoint", &self.indexer.endpoint),
            ("indexer_api_key", &self.indexer.api_key),
            ("indexer_name", &self.indexer.name),
            ("db_connection_uri", &self.database.connection_uri),
            ("tontine_module_name", &self.contract.module_name),
        ];
        for (name, value) in required_strings {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        if self.contract.module_address.len() <= tontine_common::address::ADDRESS_PREFIX.len() {
            anyhow::bail!("tontine_module_address cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.api.port == Some(0) {
            anyhow::bail!("API port must be greater than 0");
        }

        if !self.run_processor && !self.api_enabled() {
            anyhow::bail!("Nothing to run: run_processor is false and no api_port is configured");
        }

        Ok(())
    }

    pub fn api_enabled(&self) -> bool {
        self.api.port.is_some()
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.database.connection_uri.clone(),
            max_connections: self.database.max_connections,
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            chain_id: self.chain_id,
            indexer_name: self.indexer.name.clone(),
            starting_version: StartingVersionConfig {
                override_version: self.indexer.starting_version_override,
                default_version: self.indexer.starting_version,
            },
            target: ContractTarget::new(&self.contract.module_address, &self.contract.module_name),
        }
    }
}
