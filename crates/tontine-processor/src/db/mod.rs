//! Relational store for the materialized tontine view
//!
//! The processor is the only writer. All writes for one transaction version
//! go through a [`UnitOfWork`], which maps onto a single database
//! transaction: either every row change plus the checkpoint advance becomes
//! visible, or none of it does. The query API only uses the read methods on
//! [`Store`].
//!
//! Two backends implement the traits:
//!
//! - [`postgres::PgStore`] for deployments (`postgres://` / `postgresql://`)
//! - [`sqlite::SqliteStore`] for local runs and tests (`sqlite:`)

pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tontine_common::types::{
    Checkpoint, MemberTontine, MembershipDeletion, MembershipUpdate, StateUpdate,
    TontineMembership, TontineSnapshot, TontineState, TontineStateKind,
};

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connection string or pool settings are unusable
    #[error("Database configuration error: {0}. Check db_connection_uri.")]
    Config(String),

    /// A stored checkpoint holds a value no version can have
    #[error("Checkpoint for '{indexer_name}' holds invalid next_version {value}")]
    CorruptCheckpoint { indexer_name: String, value: i64 },

    /// A state row holds an unknown discriminant
    #[error("Invalid state row for tontine '{tontine_address}': {source}")]
    InvalidState {
        tontine_address: String,
        #[source]
        source: tontine_common::CommonError,
    },
}

impl DbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Connection settings for [`connect`]
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Read access plus the entry point for transactional writes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create tables and indexes that do not exist yet. Safe to call on every start.
    async fn ensure_schema(&self) -> DbResult<()>;

    async fn health_check(&self) -> DbResult<()>;

    /// Persisted checkpoint row for `indexer_name`, if any.
    async fn checkpoint(&self, indexer_name: &str) -> DbResult<Option<Checkpoint>>;

    /// Open a unit of work. Dropping it without [`UnitOfWork::commit`] rolls back.
    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>>;

    /// Every tontine `member_address` belongs to, ordered by tontine address.
    async fn member_tontines(&self, member_address: &str) -> DbResult<Vec<MemberTontine>>;

    /// Every membership row of `tontine_address`, ordered by member address.
    async fn tontine_members(&self, tontine_address: &str) -> DbResult<Vec<TontineMembership>>;

    async fn tontine_state(&self, tontine_address: &str) -> DbResult<Option<TontineStateKind>>;

    /// State and members of `tontine_address` from a single statement, so
    /// both reflect the same committed version.
    async fn tontine(&self, tontine_address: &str) -> DbResult<TontineSnapshot>;

    /// Next unprocessed version for `indexer_name`, or `None` before the first commit.
    async fn next_version(&self, indexer_name: &str) -> DbResult<Option<i64>> {
        Ok(self
            .checkpoint(indexer_name)
            .await?
            .map(|checkpoint| checkpoint.next_version))
    }
}

/// The write operations of one transaction version.
///
/// Field updates and deletions that target missing rows are no-ops.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Insert a membership row; on conflict overwrite `is_creator` and keep
    /// `has_ever_contributed` set if it already was.
    async fn upsert_membership(&mut self, membership: &TontineMembership) -> DbResult<()>;

    async fn mark_contributed(&mut self, update: &MembershipUpdate) -> DbResult<()>;

    async fn delete_membership(&mut self, deletion: &MembershipDeletion) -> DbResult<()>;

    /// Insert a state row; on conflict overwrite `state`.
    async fn upsert_state(&mut self, state: &TontineState) -> DbResult<()>;

    async fn update_state(&mut self, update: &StateUpdate) -> DbResult<()>;

    async fn delete_state(&mut self, tontine_address: &str) -> DbResult<()>;

    /// Remove every membership and state row of `tontine_address`.
    async fn delete_tontine(&mut self, tontine_address: &str) -> DbResult<()>;

    /// Upsert the checkpoint row and refresh its `updated_at`.
    async fn set_next_version(&mut self, indexer_name: &str, next_version: i64) -> DbResult<()>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;
}

/// Connect to the store named by `config.url`, picking the backend by scheme.
pub async fn connect(config: &DbConfig) -> DbResult<Arc<dyn Store>> {
    if config.max_connections == 0 {
        return Err(DbError::config("max_connections must be greater than 0"));
    }

    let url = config.url.as_str();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Arc::new(postgres::PgStore::connect(config).await?))
    } else if url.starts_with("sqlite:") {
        Ok(Arc::new(sqlite::SqliteStore::connect(config).await?))
    } else {
        let scheme = url.split(':').next().unwrap_or_default();
        Err(DbError::config(format!("Unsupported database scheme '{}'", scheme)))
    }
}

/// Convert a stored `next_version` into a stream version.
pub fn checkpoint_version(indexer_name: &str, value: i64) -> DbResult<u64> {
    u64::try_from(value).map_err(|_| DbError::CorruptCheckpoint {
        indexer_name: indexer_name.to_string(),
        value,
    })
}

/// Decode a nullable `state` column.
pub fn decode_state(tontine_address: &str, raw: Option<i64>) -> DbResult<Option<TontineStateKind>> {
    raw.map(TontineStateKind::try_from)
        .transpose()
        .map_err(|source| DbError::InvalidState {
            tontine_address: tontine_address.to_string(),
            source,
        })
}

/// One row of the state/membership outer join behind [`Store::tontine`].
/// Member columns are NULL when the tontine has no membership rows.
#[derive(Debug, Default, sqlx::FromRow)]
pub struct SnapshotRow {
    pub state: Option<i64>,
    pub member_address: Option<String>,
    pub is_creator: Option<bool>,
    pub has_ever_contributed: Option<bool>,
}

/// Fold the joined rows into a snapshot. Every row carries the same state.
pub fn snapshot_from_rows(
    tontine_address: &str,
    rows: Vec<SnapshotRow>,
) -> DbResult<TontineSnapshot> {
    let state = decode_state(tontine_address, rows.first().and_then(|row| row.state))?;
    let members = rows
        .into_iter()
        .filter_map(|row| {
            Some(TontineMembership {
                tontine_address: tontine_address.to_string(),
                member_address: row.member_address?,
                is_creator: row.is_creator.unwrap_or_default(),
                has_ever_contributed: row.has_ever_contributed.unwrap_or_default(),
            })
        })
        .collect();

    Ok(TontineSnapshot {
        tontine_address: tontine_address.to_string(),
        state,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let config = DbConfig {
            url: "mysql://localhost/tontine".to_string(),
            max_connections: 1,
        };
        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, DbError::Config(ref msg) if msg.contains("mysql")));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_pool() {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 0,
        };
        assert!(matches!(connect(&config).await, Err(DbError::Config(_))));
    }

    #[test]
    fn test_decode_state() {
        assert_eq!(decode_state("0xa", None).unwrap(), None);
        assert_eq!(
            decode_state("0xa", Some(1)).unwrap(),
            Some(TontineStateKind::Locked)
        );
        assert!(matches!(
            decode_state("0xa", Some(9)),
            Err(DbError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_snapshot_from_rows() {
        let rows = vec![
            SnapshotRow {
                state: Some(0),
                member_address: Some("0x1".to_string()),
                is_creator: Some(true),
                has_ever_contributed: Some(false),
            },
            SnapshotRow {
                state: Some(0),
                member_address: Some("0x2".to_string()),
                is_creator: Some(false),
                has_ever_contributed: Some(true),
            },
        ];
        let snapshot = snapshot_from_rows("0xa", rows).unwrap();
        assert_eq!(snapshot.state, Some(TontineStateKind::Staging));
        assert_eq!(snapshot.members.len(), 2);
        assert!(snapshot.members[0].is_creator);
        assert!(snapshot.members[1].has_ever_contributed);
        assert!(snapshot.members.iter().all(|m| m.tontine_address == "0xa"));
    }

    #[test]
    fn test_snapshot_from_all_null_row() {
        let snapshot = snapshot_from_rows("0xa", vec![SnapshotRow::default()]).unwrap();
        assert!(snapshot.is_unknown());

        let locked_only = vec![SnapshotRow {
            state: Some(1),
            ..SnapshotRow::default()
        }];
        let snapshot = snapshot_from_rows("0xa", locked_only).unwrap();
        assert_eq!(snapshot.state, Some(TontineStateKind::Locked));
        assert!(snapshot.members.is_empty());
    }

    #[test]
    fn test_checkpoint_version_rejects_negative() {
        assert_eq!(checkpoint_version("idx", 12).unwrap(), 12);
        assert!(matches!(
            checkpoint_version("idx", -1),
            Err(DbError::CorruptCheckpoint { value: -1, .. })
        ));
    }
}
