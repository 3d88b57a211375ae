use serde::{Deserialize, Serialize};
use tontine_common::types::MemberTontine;

use super::parse_address;
use crate::db::{DbError, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMemberTontinesQuery {
    pub member_address: String,
}

/// One tontine in a member lookup. `state` is -1 once the tontine is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTontineResponse {
    pub tontine_address: String,
    pub is_creator: bool,
    pub has_ever_contributed: bool,
    pub state: i32,
}

impl From<MemberTontine> for MemberTontineResponse {
    fn from(row: MemberTontine) -> Self {
        Self {
            tontine_address: row.tontine_address,
            is_creator: row.is_creator,
            has_ever_contributed: row.has_ever_contributed,
            state: row.state,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetMemberTontinesError {
    #[error("Invalid member address '{0}'")]
    InvalidAddress(String),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn Store,
    query: GetMemberTontinesQuery,
) -> Result<Vec<MemberTontineResponse>, GetMemberTontinesError> {
    let member_address = parse_address(&query.member_address)
        .ok_or_else(|| GetMemberTontinesError::InvalidAddress(query.member_address.clone()))?;

    let tontines = store.member_tontines(&member_address).await?;

    Ok(tontines.into_iter().map(MemberTontineResponse::from).collect())
}
