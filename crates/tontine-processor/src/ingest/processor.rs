//! The ingestion loop
//!
//! ```text
//! Resolving ──► Streaming { current_version } ──► Terminated
//! ```
//!
//! One transaction is decoded, applied and checkpointed before the next one
//! is looked at. Every anomaly is fatal: the loop stops and returns the
//! error, and a restart resumes from the persisted checkpoint.

use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::checkpoint::{resolve_starting_version, StartingVersionConfig};
use super::decoder::{decode, ContractTarget};
use super::error::{IngestError, IngestResult, ProtocolViolation};
use super::materializer::Materializer;
use super::models::TransactionsResponse;
use super::stream::TransactionSource;
use crate::db::Store;

/// Versions between two progress log lines.
pub const PROGRESS_INTERVAL: u64 = 1000;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub chain_id: u64,
    pub indexer_name: String,
    pub starting_version: StartingVersionConfig,
    pub target: ContractTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Resolving,
    Streaming { current_version: u64 },
    Terminated,
}

/// Why [`TontineProcessor::run`] returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorExit {
    /// The upstream ended the stream.
    StreamClosed,
    /// The shutdown token was cancelled.
    Shutdown,
}

enum BatchOutcome {
    Continue,
    Shutdown,
}

pub struct TontineProcessor {
    config: ProcessorConfig,
    store: Arc<dyn Store>,
    source: Arc<dyn TransactionSource>,
    materializer: Materializer,
    state: ProcessorState,
}

impl TontineProcessor {
    pub fn new(
        config: ProcessorConfig,
        store: Arc<dyn Store>,
        source: Arc<dyn TransactionSource>,
    ) -> Self {
        let materializer = Materializer::new(store.clone(), config.indexer_name.clone());
        Self {
            config,
            store,
            source,
            materializer,
            state: ProcessorState::Resolving,
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// Consume the stream until it closes, `shutdown` is cancelled, or a
    /// fatal error occurs.
    pub async fn run(&mut self, shutdown: CancellationToken) -> IngestResult<ProcessorExit> {
        self.state = ProcessorState::Resolving;
        let result = self.stream(&shutdown).await;
        self.state = ProcessorState::Terminated;

        match &result {
            Ok(exit) => info!(indexer_name = %self.config.indexer_name, ?exit, "Processor stopped"),
            Err(e) => error!(
                indexer_name = %self.config.indexer_name,
                version = ?e.version(),
                error = %e,
                "Processor terminated"
            ),
        }

        result
    }

    async fn stream(&mut self, shutdown: &CancellationToken) -> IngestResult<ProcessorExit> {
        let start = resolve_starting_version(
            self.store.as_ref(),
            &self.config.indexer_name,
            &self.config.starting_version,
        )
        .await?;
        info!(
            starting_version = start.version,
            source = %start.source,
            "Resolved starting version"
        );

        let mut batches = self.source.open(start.version).await?;
        info!(starting_version = start.version, "Connected to the transaction stream");
        self.state = ProcessorState::Streaming {
            current_version: start.version,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(ProcessorExit::Shutdown),
                next = batches.next() => next,
            };

            let Some(batch) = next else {
                return Ok(ProcessorExit::StreamClosed);
            };

            if let BatchOutcome::Shutdown = self.process_batch(batch?, shutdown).await? {
                return Ok(ProcessorExit::Shutdown);
            }
        }
    }

    async fn process_batch(
        &mut self,
        batch: TransactionsResponse,
        shutdown: &CancellationToken,
    ) -> IngestResult<BatchOutcome> {
        if batch.chain_id != Some(self.config.chain_id) {
            return Err(ProtocolViolation::ChainIdMismatch {
                expected: self.config.chain_id,
                actual: batch.chain_id,
            }
            .into());
        }

        debug!(
            first_version = ?batch.first_version(),
            transactions = batch.transactions.len(),
            "Response received"
        );

        for transaction in &batch.transactions {
            if shutdown.is_cancelled() {
                return Ok(BatchOutcome::Shutdown);
            }

            let expected = self.current_version();
            if transaction.version != expected {
                return Err(ProtocolViolation::VersionMismatch {
                    expected,
                    actual: transaction.version,
                }
                .into());
            }

            let version = transaction.version;
            let mutations = decode(transaction, &self.config.target)
                .map_err(|source| IngestError::Decode { version, source })?;
            self.materializer.apply(version, &mutations).await?;

            if version % PROGRESS_INTERVAL == 0 {
                info!(last_success_version = version, "Successfully processed transaction");
            }

            self.state = ProcessorState::Streaming {
                current_version: version + 1,
            };
        }

        Ok(BatchOutcome::Continue)
    }

    fn current_version(&self) -> u64 {
        match self.state {
            ProcessorState::Streaming { current_version } => current_version,
            ProcessorState::Resolving | ProcessorState::Terminated => 0,
        }
    }
}
