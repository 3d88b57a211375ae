//! Wire model of the upstream transaction stream
//!
//! These types follow the JSON mapping of the indexer's transaction protocol:
//! camelCase field names (snake_case is accepted too) and 64-bit integers
//! that may arrive either as JSON strings or as numbers. Only the parts of a
//! transaction the decoder looks at are modelled; everything else is ignored.

use serde::{Deserialize, Deserializer, Serialize};

/// Request body that opens a stream at `starting_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTransactionsRequest {
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub starting_version: Option<u64>,
    /// Stop after this many transactions. `None` streams indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de_opt_u64")]
    pub transactions_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de_opt_u64")]
    pub batch_size: Option<u64>,
}

impl GetTransactionsRequest {
    pub fn from_version(starting_version: u64) -> Self {
        Self {
            starting_version: Some(starting_version),
            transactions_count: None,
            batch_size: None,
        }
    }
}

/// One batch of the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    #[serde(default, alias = "chain_id", deserialize_with = "de_opt_u64")]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl TransactionsResponse {
    pub fn first_version(&self) -> Option<u64> {
        self.transactions.first().map(|txn| txn.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(deserialize_with = "de_u64")]
    pub version: u64,
    #[serde(rename = "type", default)]
    pub transaction_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserTransaction>,
}

/// Transaction kind discriminator.
///
/// Values introduced upstream after this enum was written decode as
/// [`TransactionType::Unknown`] instead of failing the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[default]
    #[serde(rename = "TRANSACTION_TYPE_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "TRANSACTION_TYPE_GENESIS")]
    Genesis,
    #[serde(rename = "TRANSACTION_TYPE_BLOCK_METADATA")]
    BlockMetadata,
    #[serde(rename = "TRANSACTION_TYPE_STATE_CHECKPOINT")]
    StateCheckpoint,
    #[serde(rename = "TRANSACTION_TYPE_USER")]
    User,
    #[serde(rename = "TRANSACTION_TYPE_VALIDATOR")]
    Validator,
    #[serde(rename = "TRANSACTION_TYPE_BLOCK_EPILOGUE")]
    BlockEpilogue,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<UserTransactionRequest>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl UserTransaction {
    /// The entry function call of this transaction, if it was one.
    pub fn entry_function(&self) -> Option<&EntryFunctionPayload> {
        self.request
            .as_ref()?
            .payload
            .as_ref()?
            .entry_function_payload
            .as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTransactionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TransactionPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    #[serde(
        default,
        alias = "entry_function_payload",
        skip_serializing_if = "Option::is_none"
    )]
    pub entry_function_payload: Option<EntryFunctionPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFunctionPayload {
    /// `<address>::<module>::<function>`
    #[serde(default, alias = "entry_function_id_str")]
    pub entry_function_id_str: String,
    /// JSON-encoded call arguments.
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<EventKey>,
    #[serde(rename = "type", default)]
    pub event_type: MoveType,
    /// JSON-encoded event payload.
    #[serde(default)]
    pub data: String,
}

impl Event {
    pub fn struct_tag(&self) -> Option<&MoveStructTag> {
        self.event_type.struct_tag.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    #[serde(default, alias = "account_address")]
    pub account_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveType {
    #[serde(rename = "struct", default, skip_serializing_if = "Option::is_none")]
    pub struct_tag: Option<MoveStructTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStructTag {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// u64 helpers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrU64 {
    Number(u64),
    String(String),
}

impl StringOrU64 {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            StringOrU64::Number(value) => Ok(value),
            StringOrU64::String(value) => value
                .parse()
                .map_err(|_| E::custom(format!("invalid u64 string '{}'", value))),
        }
    }
}

fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrU64::deserialize(deserializer)?.into_u64()
}

fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<StringOrU64>::deserialize(deserializer)?
        .map(StringOrU64::into_u64)
        .transpose()
}
