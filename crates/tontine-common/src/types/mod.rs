//! Domain types shared by the processor and the query API
//!
//! These mirror the three materialized tables (`tontine_membership`,
//! `tontine_state`, `next_versions_to_process`) and the mutation records the
//! decoder emits for each transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// `state` value reported for a tontine that has no state row.
///
/// A missing state row means the tontine finished (funds claimed, fallback
/// executed) or was destroyed.
pub const STATE_COMPLETE: i32 = -1;

// ============================================================================
// Table Rows
// ============================================================================

/// Lifecycle state of a tontine that is still active.
///
/// Completion is represented by deleting the row, so there is no
/// `Complete` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TontineStateKind {
    Staging,
    Locked,
}

impl TontineStateKind {
    /// Integer stored in the `state` column.
    pub fn as_i32(self) -> i32 {
        match self {
            TontineStateKind::Staging => 0,
            TontineStateKind::Locked => 1,
        }
    }
}

impl TryFrom<i64> for TontineStateKind {
    type Error = CommonError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TontineStateKind::Staging),
            1 => Ok(TontineStateKind::Locked),
            other => Err(CommonError::InvalidState(other)),
        }
    }
}

impl std::fmt::Display for TontineStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TontineStateKind::Staging => write!(f, "staging"),
            TontineStateKind::Locked => write!(f, "locked"),
        }
    }
}

/// One row of `tontine_membership`, unique per (tontine, member).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TontineMembership {
    pub tontine_address: String,
    pub member_address: String,
    pub is_creator: bool,
    /// True once the member contributed, even if they later withdrew.
    pub has_ever_contributed: bool,
}

/// One row of `tontine_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TontineState {
    pub tontine_address: String,
    pub state: TontineStateKind,
}

/// Persisted ingestion progress for one named source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub indexer_name: String,
    /// First version that has not been applied yet.
    pub next_version: i64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Mutations
// ============================================================================

/// Sets `has_ever_contributed` on an existing membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    pub tontine_address: String,
    pub member_address: String,
    pub has_ever_contributed: bool,
}

/// Removes a single membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipDeletion {
    pub tontine_address: String,
    pub member_address: String,
}

/// Changes the state of an existing state row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub tontine_address: String,
    pub state: TontineStateKind,
}

/// Everything one transaction changes in the materialized view.
///
/// The collections are applied in field order: additions, updates, scoped
/// deletions and finally whole-tontine deletions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TontineMutations {
    pub membership_additions: Vec<TontineMembership>,
    pub membership_updates: Vec<MembershipUpdate>,
    pub membership_deletions: Vec<MembershipDeletion>,
    pub state_additions: Vec<TontineState>,
    pub state_updates: Vec<StateUpdate>,
    /// Tontine addresses whose state row is removed.
    pub state_deletions: Vec<String>,
    /// Tontine addresses whose membership and state rows are all removed.
    pub tontine_deletions: Vec<String>,
}

impl TontineMutations {
    pub fn is_empty(&self) -> bool {
        self.membership_additions.is_empty()
            && self.membership_updates.is_empty()
            && self.membership_deletions.is_empty()
            && self.state_additions.is_empty()
            && self.state_updates.is_empty()
            && self.state_deletions.is_empty()
            && self.tontine_deletions.is_empty()
    }

    /// Total number of row operations across all collections.
    pub fn len(&self) -> usize {
        self.membership_additions.len()
            + self.membership_updates.len()
            + self.membership_deletions.len()
            + self.state_additions.len()
            + self.state_updates.len()
            + self.state_deletions.len()
            + self.tontine_deletions.len()
    }
}

// ============================================================================
// Query Results
// ============================================================================

/// A tontine as seen from one member, returned by the member lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTontine {
    pub tontine_address: String,
    pub is_creator: bool,
    pub has_ever_contributed: bool,
    /// State discriminant, or [`STATE_COMPLETE`] when no state row exists.
    pub state: i32,
}

impl MemberTontine {
    /// Decode the `state` column of a LEFT JOIN into the API value.
    pub fn state_value(state: Option<TontineStateKind>) -> i32 {
        state.map(TontineStateKind::as_i32).unwrap_or(STATE_COMPLETE)
    }
}

/// A tontine's state and membership rows read in one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TontineSnapshot {
    pub tontine_address: String,
    pub state: Option<TontineStateKind>,
    /// Ordered by member address.
    pub members: Vec<TontineMembership>,
}

impl TontineSnapshot {
    /// Neither a state row nor any membership row exists.
    pub fn is_unknown(&self) -> bool {
        self.state.is_none() && self.members.is_empty()
    }
}
