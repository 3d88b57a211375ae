//! Starting version resolution
//!
//! First match wins: configured override, persisted checkpoint, configured
//! default, genesis.

use serde::Serialize;

use super::error::{IngestError, IngestResult};
use crate::db::{checkpoint_version, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartingVersionConfig {
    /// Used even when a checkpoint exists.
    pub override_version: Option<u64>,
    /// Used only when no checkpoint exists.
    pub default_version: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartSource {
    Override,
    Checkpoint,
    ConfigDefault,
    Genesis,
}

impl std::fmt::Display for StartSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartSource::Override => write!(f, "override"),
            StartSource::Checkpoint => write!(f, "checkpoint"),
            StartSource::ConfigDefault => write!(f, "config_default"),
            StartSource::Genesis => write!(f, "genesis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedStart {
    pub version: u64,
    pub source: StartSource,
}

pub async fn resolve_starting_version(
    store: &dyn Store,
    indexer_name: &str,
    config: &StartingVersionConfig,
) -> IngestResult<ResolvedStart> {
    if let Some(version) = config.override_version {
        return Ok(ResolvedStart {
            version,
            source: StartSource::Override,
        });
    }

    let stored = store
        .next_version(indexer_name)
        .await
        .map_err(IngestError::Checkpoint)?;
    if let Some(value) = stored {
        let version = checkpoint_version(indexer_name, value).map_err(IngestError::Checkpoint)?;
        return Ok(ResolvedStart {
            version,
            source: StartSource::Checkpoint,
        });
    }

    Ok(match config.default_version {
        Some(version) => ResolvedStart {
            version,
            source: StartSource::ConfigDefault,
        },
        None => ResolvedStart {
            version: 0,
            source: StartSource::Genesis,
        },
    })
}
