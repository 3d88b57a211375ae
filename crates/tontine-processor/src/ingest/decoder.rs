//! Transaction to mutation translation
//!
//! [`decode`] is pure: it inspects one transaction and returns the row
//! changes it implies for the materialized view. Events from other modules,
//! and event names outside the known vocabulary, are skipped so that contract
//! upgrades emitting new events do not stop ingestion.

use serde::de::IgnoredAny;
use serde::Deserialize;
use tontine_common::normalize_address;
use tontine_common::types::{
    MembershipDeletion, MembershipUpdate, StateUpdate, TontineMembership, TontineMutations,
    TontineState, TontineStateKind,
};

use super::error::DecodeError;
use super::models::{Event, Transaction, TransactionType, UserTransaction};

pub const TONTINE_CREATED_EVENT: &str = "TontineCreatedEvent";
pub const TONTINE_LOCKED_EVENT: &str = "TontineLockedEvent";
pub const MEMBER_INVITED_EVENT: &str = "MemberInvitedEvent";
pub const MEMBER_CONTRIBUTED_EVENT: &str = "MemberContributedEvent";
pub const MEMBER_LEFT_EVENT: &str = "MemberLeftEvent";
pub const FUNDS_CLAIMED_EVENT: &str = "FundsClaimedEvent";
pub const FALLBACK_EXECUTED_EVENT: &str = "FallbackExecutedEvent";

const DESTROY_FUNCTION: &str = "destroy";

/// The on-chain module whose events are materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTarget {
    /// Always `0x`-prefixed.
    pub module_address: String,
    pub module_name: String,
}

impl ContractTarget {
    pub fn new(module_address: &str, module_name: impl Into<String>) -> Self {
        Self {
            module_address: normalize_address(module_address),
            module_name: module_name.into(),
        }
    }

    /// Fully qualified id of the contract's `destroy` entry function.
    pub fn destroy_function_id(&self) -> String {
        format!(
            "{}::{}::{}",
            self.module_address, self.module_name, DESTROY_FUNCTION
        )
    }

    fn emitted(&self, event: &Event) -> bool {
        event.struct_tag().is_some_and(|tag| {
            tag.module == self.module_name && normalize_address(&tag.address) == self.module_address
        })
    }

    fn is_destroy_call(&self, function_id: &str) -> bool {
        let mut parts = function_id.splitn(2, "::");
        match (parts.next(), parts.next()) {
            (Some(address), Some(rest)) => {
                format!("{}::{}", normalize_address(address), rest) == self.destroy_function_id()
            },
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct CreatorPayload {
    creator: String,
}

#[derive(Deserialize)]
struct MemberPayload {
    member: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectArgument {
    Object { inner: String },
    Address(String),
}

/// Row changes implied by `transaction` for the contract `target`.
///
/// Only user transactions can carry contract events; every other kind yields
/// an empty [`TontineMutations`].
pub fn decode(
    transaction: &Transaction,
    target: &ContractTarget,
) -> Result<TontineMutations, DecodeError> {
    let mut mutations = TontineMutations::default();

    if transaction.transaction_type != TransactionType::User {
        return Ok(mutations);
    }
    let Some(user) = transaction.user.as_ref() else {
        return Ok(mutations);
    };

    for event in user.events.iter().filter(|event| target.emitted(event)) {
        decode_event(event, &mut mutations)?;
    }

    if let Some(tontine_address) = destroyed_tontine(user, target)? {
        mutations.tontine_deletions.push(tontine_address);
    }

    Ok(mutations)
}

fn decode_event(event: &Event, mutations: &mut TontineMutations) -> Result<(), DecodeError> {
    let Some(tag) = event.struct_tag() else {
        return Ok(());
    };
    let event_type = tag.name.as_str();

    let tontine_address = || -> Result<String, DecodeError> {
        event
            .key
            .as_ref()
            .map(|key| normalize_address(&key.account_address))
            .ok_or_else(|| DecodeError::MissingEventKey {
                event_type: event_type.to_string(),
            })
    };

    match event_type {
        TONTINE_CREATED_EVENT => {
            let tontine_address = tontine_address()?;
            let payload: CreatorPayload = parse_payload(event_type, &event.data)?;
            mutations.membership_additions.push(TontineMembership {
                tontine_address: tontine_address.clone(),
                member_address: normalize_address(&payload.creator),
                is_creator: true,
                has_ever_contributed: false,
            });
            mutations.state_additions.push(TontineState {
                tontine_address,
                state: TontineStateKind::Staging,
            });
        },
        TONTINE_LOCKED_EVENT => {
            let tontine_address = tontine_address()?;
            parse_payload::<IgnoredAny>(event_type, &event.data)?;
            mutations.state_updates.push(StateUpdate {
                tontine_address,
                state: TontineStateKind::Locked,
            });
        },
        MEMBER_INVITED_EVENT => {
            let tontine_address = tontine_address()?;
            let payload: MemberPayload = parse_payload(event_type, &event.data)?;
            mutations.membership_additions.push(TontineMembership {
                tontine_address,
                member_address: normalize_address(&payload.member),
                is_creator: false,
                has_ever_contributed: false,
            });
        },
        MEMBER_CONTRIBUTED_EVENT => {
            let tontine_address = tontine_address()?;
            let payload: MemberPayload = parse_payload(event_type, &event.data)?;
            mutations.membership_updates.push(MembershipUpdate {
                tontine_address,
                member_address: normalize_address(&payload.member),
                has_ever_contributed: true,
            });
        },
        MEMBER_LEFT_EVENT => {
            let tontine_address = tontine_address()?;
            let payload: MemberPayload = parse_payload(event_type, &event.data)?;
            mutations.membership_deletions.push(MembershipDeletion {
                tontine_address,
                member_address: normalize_address(&payload.member),
            });
        },
        // Membership rows are kept; the tontine reads as complete once its
        // state row is gone.
        FUNDS_CLAIMED_EVENT | FALLBACK_EXECUTED_EVENT => {
            let tontine_address = tontine_address()?;
            parse_payload::<IgnoredAny>(event_type, &event.data)?;
            mutations.state_deletions.push(tontine_address);
        },
        _ => {},
    }

    Ok(())
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    event_type: &str,
    data: &str,
) -> Result<T, DecodeError> {
    serde_json::from_str(data).map_err(|e| DecodeError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}

fn destroyed_tontine(
    user: &UserTransaction,
    target: &ContractTarget,
) -> Result<Option<String>, DecodeError> {
    let Some(entry) = user.entry_function() else {
        return Ok(None);
    };
    if !target.is_destroy_call(&entry.entry_function_id_str) {
        return Ok(None);
    }

    let argument = entry
        .arguments
        .first()
        .ok_or_else(|| DecodeError::MalformedDestroyArgument {
            reason: "missing tontine argument".to_string(),
        })?;

    let address = match serde_json::from_str::<ObjectArgument>(argument) {
        Ok(ObjectArgument::Object { inner }) => inner,
        Ok(ObjectArgument::Address(address)) => address,
        Err(e) => {
            return Err(DecodeError::MalformedDestroyArgument {
                reason: format!("{}: {}", argument, e),
            })
        },
    };

    Ok(Some(normalize_address(&address)))
}
