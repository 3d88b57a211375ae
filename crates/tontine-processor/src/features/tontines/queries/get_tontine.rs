use serde::{Deserialize, Serialize};
use tontine_common::types::MemberTontine;

use super::parse_address;
use crate::db::{DbError, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTontineQuery {
    pub tontine_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TontineMemberResponse {
    pub member_address: String,
    pub is_creator: bool,
    pub has_ever_contributed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTontineResponse {
    pub tontine_address: String,
    /// 0 staging, 1 locked, -1 complete.
    pub state: i32,
    pub members: Vec<TontineMemberResponse>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetTontineError {
    #[error("Invalid tontine address '{0}'")]
    InvalidAddress(String),
    #[error("Tontine '{0}' not found")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn Store,
    query: GetTontineQuery,
) -> Result<GetTontineResponse, GetTontineError> {
    let tontine_address = parse_address(&query.tontine_address)
        .ok_or_else(|| GetTontineError::InvalidAddress(query.tontine_address.clone()))?;

    let snapshot = store.tontine(&tontine_address).await?;
    if snapshot.is_unknown() {
        return Err(GetTontineError::NotFound(tontine_address));
    }

    Ok(GetTontineResponse {
        tontine_address,
        state: MemberTontine::state_value(snapshot.state),
        members: snapshot
            .members
            .into_iter()
            .map(|member| TontineMemberResponse {
                member_address: member.member_address,
                is_creator: member.is_creator,
                has_ever_contributed: member.has_ever_contributed,
            })
            .collect(),
    })
}
