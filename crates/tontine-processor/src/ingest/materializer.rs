//! Atomic apply-and-checkpoint of one transaction version

use std::sync::Arc;
use tontine_common::types::TontineMutations;

use super::error::{IngestError, IngestResult};
use crate::db::{DbResult, Store, UnitOfWork};

/// Writes decoded mutations and the checkpoint advance in one unit of work.
pub struct Materializer {
    store: Arc<dyn Store>,
    indexer_name: String,
}

impl Materializer {
    pub fn new(store: Arc<dyn Store>, indexer_name: impl Into<String>) -> Self {
        Self {
            store,
            indexer_name: indexer_name.into(),
        }
    }

    /// Apply `mutations` for `version` and move the checkpoint to `version + 1`.
    ///
    /// On failure nothing is committed, so the same version is processed again
    /// after a restart.
    pub async fn apply(&self, version: u64, mutations: &TontineMutations) -> IngestResult<()> {
        let next_version = version
            .checked_add(1)
            .and_then(|next| i64::try_from(next).ok())
            .ok_or(IngestError::VersionOutOfRange(version))?;

        let store_write = |source| IngestError::StoreWrite { version, source };

        let mut uow = self.store.begin().await.map_err(store_write)?;

        let written = write(uow.as_mut(), &self.indexer_name, next_version, mutations).await;
        match written {
            Ok(()) => uow.commit().await.map_err(store_write),
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::warn!(
                        version,
                        error = %rollback_err,
                        "Rollback failed after write error"
                    );
                }
                Err(store_write(e))
            },
        }
    }
}

async fn write(
    uow: &mut dyn UnitOfWork,
    indexer_name: &str,
    next_version: i64,
    mutations: &TontineMutations,
) -> DbResult<()> {
    for membership in &mutations.membership_additions {
        uow.upsert_membership(membership).await?;
    }
    for state in &mutations.state_additions {
        uow.upsert_state(state).await?;
    }

    for update in &mutations.membership_updates {
        uow.mark_contributed(update).await?;
    }
    for update in &mutations.state_updates {
        uow.update_state(update).await?;
    }

    for deletion in &mutations.membership_deletions {
        uow.delete_membership(deletion).await?;
    }
    for tontine_address in &mutations.state_deletions {
        uow.delete_state(tontine_address).await?;
    }

    // Last, so a destroy in the same version wins over everything above.
    for tontine_address in &mutations.tontine_deletions {
        uow.delete_tontine(tontine_address).await?;
    }

    uow.set_next_version(indexer_name, next_version).await
}
