//! Test helpers for tontine processor integration tests
//!
//! - Transaction builders for the contract's events and calls
//! - A scripted in-memory [`TransactionSource`]
//! - A store wrapper that fails a chosen checkpoint write, standing in for a
//!   crash before commit
#![allow(dead_code)]

use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};
use tontine_common::types::{
    Checkpoint, MemberTontine, MembershipDeletion, MembershipUpdate, StateUpdate,
    TontineMembership, TontineSnapshot, TontineState, TontineStateKind,
};
use tontine_processor::db::sqlite::SqliteStore;
use tontine_processor::db::{DbError, DbResult, Store, UnitOfWork};
use tontine_processor::ingest::models::{
    EntryFunctionPayload, Event, EventKey, MoveStructTag, MoveType, Transaction,
    TransactionPayload, TransactionType, TransactionsResponse, UserTransaction,
    UserTransactionRequest,
};
use tontine_processor::ingest::{
    ContractTarget, IngestResult, ProcessorConfig, StartingVersionConfig, TransactionSource,
    TransactionStream,
};

pub const CHAIN_ID: u64 = 2;
pub const MODULE_ADDRESS: &str = "0xc0ffee";
pub const MODULE_NAME: &str = "tontine07";
pub const INDEXER_NAME: &str = "tontine_test";

// ============================================================================
// Builders
// ============================================================================

pub fn target() -> ContractTarget {
    ContractTarget::new(MODULE_ADDRESS, MODULE_NAME)
}

pub fn processor_config(starting_version: StartingVersionConfig) -> ProcessorConfig {
    ProcessorConfig {
        chain_id: CHAIN_ID,
        indexer_name: INDEXER_NAME.to_string(),
        starting_version,
        target: target(),
    }
}

pub async fn memory_store() -> Arc<dyn Store> {
    Arc::new(SqliteStore::in_memory().await.unwrap())
}

pub fn event_from(module_address: &str, name: &str, tontine: &str, data: serde_json::Value) -> Event {
    Event {
        key: Some(EventKey {
            account_address: tontine.to_string(),
        }),
        event_type: MoveType {
            struct_tag: Some(MoveStructTag {
                address: module_address.to_string(),
                module: MODULE_NAME.to_string(),
                name: name.to_string(),
            }),
        },
        data: data.to_string(),
    }
}

pub fn event(name: &str, tontine: &str, data: serde_json::Value) -> Event {
    event_from(MODULE_ADDRESS, name, tontine, data)
}

pub fn created(tontine: &str, creator: &str) -> Event {
    event(
        "TontineCreatedEvent",
        tontine,
        serde_json::json!({"creator": creator}),
    )
}

pub fn invited(tontine: &str, member: &str) -> Event {
    event(
        "MemberInvitedEvent",
        tontine,
        serde_json::json!({"member": member}),
    )
}

pub fn contributed(tontine: &str, member: &str) -> Event {
    event(
        "MemberContributedEvent",
        tontine,
        serde_json::json!({"member": member, "amount": "100000"}),
    )
}

pub fn left(tontine: &str, member: &str) -> Event {
    event("MemberLeftEvent", tontine, serde_json::json!({"member": member}))
}

pub fn locked(tontine: &str) -> Event {
    event("TontineLockedEvent", tontine, serde_json::json!({}))
}

pub fn funds_claimed(tontine: &str) -> Event {
    event("FundsClaimedEvent", tontine, serde_json::json!({}))
}

pub fn user_txn(version: u64, events: Vec<Event>) -> Transaction {
    Transaction {
        version,
        transaction_type: TransactionType::User,
        user: Some(UserTransaction {
            request: None,
            events,
        }),
    }
}

pub fn system_txn(version: u64) -> Transaction {
    Transaction {
        version,
        transaction_type: TransactionType::BlockMetadata,
        user: None,
    }
}

/// Attach a `destroy(tontine)` entry function call to `txn`.
pub fn with_destroy_call(mut txn: Transaction, tontine: &str) -> Transaction {
    if let Some(user) = txn.user.as_mut() {
        user.request = Some(UserTransactionRequest {
            payload: Some(TransactionPayload {
                entry_function_payload: Some(EntryFunctionPayload {
                    entry_function_id_str: format!("{}::{}::destroy", MODULE_ADDRESS, MODULE_NAME),
                    arguments: vec![serde_json::json!({"inner": tontine}).to_string()],
                }),
            }),
        });
    }
    txn
}

pub fn batch(transactions: Vec<Transaction>) -> TransactionsResponse {
    TransactionsResponse {
        chain_id: Some(CHAIN_ID),
        transactions,
    }
}

// ============================================================================
// Scripted source
// ============================================================================

/// Serves a fixed list of batches once, then closes.
pub struct VecSource {
    batches: Mutex<Option<Vec<IngestResult<TransactionsResponse>>>>,
    opened_at: Mutex<Option<u64>>,
}

impl VecSource {
    pub fn new(batches: Vec<TransactionsResponse>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Some(batches.into_iter().map(Ok).collect())),
            opened_at: Mutex::new(None),
        })
    }

    /// Starting version requested by the processor, once opened.
    pub fn opened_at(&self) -> Option<u64> {
        *self.opened_at.lock().unwrap()
    }
}

#[async_trait]
impl TransactionSource for VecSource {
    async fn open(&self, starting_version: u64) -> IngestResult<TransactionStream> {
        *self.opened_at.lock().unwrap() = Some(starting_version);
        let batches = self.batches.lock().unwrap().take().unwrap_or_default();
        Ok(stream::iter(batches).boxed())
    }
}

// ============================================================================
// Crash simulation
// ============================================================================

/// Delegates to `inner` but fails the checkpoint write to `crash_at`, after
/// every row write of that version has already gone through.
pub struct CrashBeforeCommit {
    inner: Arc<dyn Store>,
    crash_at: i64,
}

impl CrashBeforeCommit {
    pub fn new(inner: Arc<dyn Store>, crash_at: i64) -> Arc<Self> {
        Arc::new(Self { inner, crash_at })
    }
}

#[async_trait]
impl Store for CrashBeforeCommit {
    async fn ensure_schema(&self) -> DbResult<()> {
        self.inner.ensure_schema().await
    }

    async fn health_check(&self) -> DbResult<()> {
        self.inner.health_check().await
    }

    async fn checkpoint(&self, indexer_name: &str) -> DbResult<Option<Checkpoint>> {
        self.inner.checkpoint(indexer_name).await
    }

    async fn begin(&self) -> DbResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(CrashingUnitOfWork {
            inner: self.inner.begin().await?,
            crash_at: self.crash_at,
        }))
    }

    async fn member_tontines(&self, member_address: &str) -> DbResult<Vec<MemberTontine>> {
        self.inner.member_tontines(member_address).await
    }

    async fn tontine_members(&self, tontine_address: &str) -> DbResult<Vec<TontineMembership>> {
        self.inner.tontine_members(tontine_address).await
    }

    async fn tontine_state(&self, tontine_address: &str) -> DbResult<Option<TontineStateKind>> {
        self.inner.tontine_state(tontine_address).await
    }

    async fn tontine(&self, tontine_address: &str) -> DbResult<TontineSnapshot> {
        self.inner.tontine(tontine_address).await
    }
}

struct CrashingUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    crash_at: i64,
}

#[async_trait]
impl UnitOfWork for CrashingUnitOfWork {
    async fn upsert_membership(&mut self, membership: &TontineMembership) -> DbResult<()> {
        self.inner.upsert_membership(membership).await
    }

    async fn mark_contributed(&mut self, update: &MembershipUpdate) -> DbResult<()> {
        self.inner.mark_contributed(update).await
    }

    async fn delete_membership(&mut self, deletion: &MembershipDeletion) -> DbResult<()> {
        self.inner.delete_membership(deletion).await
    }

    async fn upsert_state(&mut self, state: &TontineState) -> DbResult<()> {
        self.inner.upsert_state(state).await
    }

    async fn update_state(&mut self, update: &StateUpdate) -> DbResult<()> {
        self.inner.update_state(update).await
    }

    async fn delete_state(&mut self, tontine_address: &str) -> DbResult<()> {
        self.inner.delete_state(tontine_address).await
    }

    async fn delete_tontine(&mut self, tontine_address: &str) -> DbResult<()> {
        self.inner.delete_tontine(tontine_address).await
    }

    async fn set_next_version(&mut self, indexer_name: &str, next_version: i64) -> DbResult<()> {
        if next_version == self.crash_at {
            return Err(DbError::config("simulated crash before commit"));
        }
        self.inner.set_next_version(indexer_name, next_version).await
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.inner.rollback().await
    }
}
