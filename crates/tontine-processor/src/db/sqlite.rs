//! SQLite backend
//!
//! Used for single-node runs and by the test suite through
//! [`SqliteStore::in_memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use tontine_common::types::{
    Checkpoint, MemberTontine, MembershipDeletion, MembershipUpdate, StateUpdate,
    TontineMembership, TontineSnapshot, TontineState, TontineStateKind,
};

use super::{
    decode_state, snapshot_from_rows, DbConfig, DbResult, SnapshotRow, Store, UnitOfWork,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tontine_membership (
        tontine_address TEXT NOT NULL,
        member_address TEXT NOT NULL,
        is_creator BOOLEAN NOT NULL DEFAULT 0,
        has_ever_contributed BOOLEAN NOT NULL DEFAULT 0,
        PRIMARY KEY (tontine_address, member_address)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_tontine_membership_member
        ON tontine_membership (member_address)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tontine_state (
        tontine_address TEXT PRIMARY KEY,
        state INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS next_versions_to_process (
        indexer_name TEXT PRIMARY KEY,
        next_version INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// Store backed by a SQLite database file or an in-memory database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "SQLite connection pool created"
        );

        Ok(Self::new(pool))
    }

    /// A private in-memory database with the schema already in place.
    ///
    /// The pool holds a single connection so the database lives as long as
    /// the store does.
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    indexer_name: String,
    next_version: i64,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MemberTontineRow {
    tontine_address: String,
    is_creator: bool,
    has_ever_contributed: bool,
    state: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    tontine_address: String,
    member_address: String,
    is_creator: bool,
    has_ever_contributed: bool,
}

#[async_trait]
impl Store for SqliteStore {
    async fn ensure_schema(&self) -> DbResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("SQLite schema ensured");
        Ok(())
    }

    async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn checkpoint(&self, indexer_name: &str) -> DbResult<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT indexer_name, next_version, updated_at
            FROM next_versions_to_process
            WHERE indexer_name = ?1
            "#,
        )
        .bind(indexer_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Checkpoint {
            indexer_name: row.indexer_name,
            next_version: row.next_version,
            updated_at: row.updated_at,
        }))
    }

    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    async fn member_tontines(&self, member_address: &str) -> DbResult<Vec<MemberTontine>> {
        let rows = sqlx::query_as::<_, MemberTontineRow>(
            r#"
            SELECT m.tontine_address, m.is_creator, m.has_ever_contributed, s.state
            FROM tontine_membership m
            LEFT JOIN tontine_state s ON s.tontine_address = m.tontine_address
            WHERE m.member_address = ?1
            ORDER BY m.tontine_address
            "#,
        )
        .bind(member_address)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let state = decode_state(&row.tontine_address, row.state)?;
                Ok(MemberTontine {
                    tontine_address: row.tontine_address,
                    is_creator: row.is_creator,
                    has_ever_contributed: row.has_ever_contributed,
                    state: MemberTontine::state_value(state),
                })
            })
            .collect()
    }

    async fn tontine_members(&self, tontine_address: &str) -> DbResult<Vec<TontineMembership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT tontine_address, member_address, is_creator, has_ever_contributed
            FROM tontine_membership
            WHERE tontine_address = ?1
            ORDER BY member_address
            "#,
        )
        .bind(tontine_address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TontineMembership {
                tontine_address: row.tontine_address,
                member_address: row.member_address,
                is_creator: row.is_creator,
                has_ever_contributed: row.has_ever_contributed,
            })
            .collect())
    }

    async fn tontine_state(&self, tontine_address: &str) -> DbResult<Option<TontineStateKind>> {
        let state: Option<i64> =
            sqlx::query_scalar("SELECT state FROM tontine_state WHERE tontine_address = ?1")
                .bind(tontine_address)
                .fetch_optional(&self.pool)
                .await?;

        decode_state(tontine_address, state)
    }

    async fn tontine(&self, tontine_address: &str) -> DbResult<TontineSnapshot> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT s.state, m.member_address, m.is_creator, m.has_ever_contributed
            FROM (SELECT ?1 AS tontine_address) t
            LEFT JOIN tontine_state s ON s.tontine_address = t.tontine_address
            LEFT JOIN tontine_membership m ON m.tontine_address = t.tontine_address
            ORDER BY m.member_address
            "#,
        )
        .bind(tontine_address)
        .fetch_all(&self.pool)
        .await?;

        snapshot_from_rows(tontine_address, rows)
    }
}

/// One SQLite transaction
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn upsert_membership(&mut self, membership: &TontineMembership) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tontine_membership
                (tontine_address, member_address, is_creator, has_ever_contributed)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(tontine_address, member_address) DO UPDATE SET
                is_creator = excluded.is_creator,
                has_ever_contributed =
                    tontine_membership.has_ever_contributed OR excluded.has_ever_contributed
            "#,
        )
        .bind(&membership.tontine_address)
        .bind(&membership.member_address)
        .bind(membership.is_creator)
        .bind(membership.has_ever_contributed)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn mark_contributed(&mut self, update: &MembershipUpdate) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE tontine_membership
            SET has_ever_contributed = has_ever_contributed OR ?3
            WHERE tontine_address = ?1 AND member_address = ?2
            "#,
        )
        .bind(&update.tontine_address)
        .bind(&update.member_address)
        .bind(update.has_ever_contributed)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_membership(&mut self, deletion: &MembershipDeletion) -> DbResult<()> {
        sqlx::query(
            "DELETE FROM tontine_membership WHERE tontine_address = ?1 AND member_address = ?2",
        )
        .bind(&deletion.tontine_address)
        .bind(&deletion.member_address)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_state(&mut self, state: &TontineState) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tontine_state (tontine_address, state)
            VALUES (?1, ?2)
            ON CONFLICT(tontine_address) DO UPDATE SET state = excluded.state
            "#,
        )
        .bind(&state.tontine_address)
        .bind(state.state.as_i32())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_state(&mut self, update: &StateUpdate) -> DbResult<()> {
        sqlx::query("UPDATE tontine_state SET state = ?2 WHERE tontine_address = ?1")
            .bind(&update.tontine_address)
            .bind(update.state.as_i32())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_state(&mut self, tontine_address: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM tontine_state WHERE tontine_address = ?1")
            .bind(tontine_address)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_tontine(&mut self, tontine_address: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM tontine_membership WHERE tontine_address = ?1")
            .bind(tontine_address)
            .execute(&mut *self.tx)
            .await?;
        self.delete_state(tontine_address).await
    }

    async fn set_next_version(&mut self, indexer_name: &str, next_version: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO next_versions_to_process (indexer_name, next_version, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(indexer_name) DO UPDATE SET
                next_version = excluded.next_version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(indexer_name)
        .bind(next_version)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
