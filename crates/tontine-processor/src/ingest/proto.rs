//! Protobuf messages of the indexer's `aptos.indexer.v1.RawData` service
//!
//! Only the fields the decoder reads are declared, with the tags of the
//! published `aptos/indexer/v1/raw_data.proto` and
//! `aptos/transaction/v1/transaction.proto`. Protobuf decoding skips unknown
//! fields and unknown oneof variants, so signatures, write sets, block
//! metadata and the rest of a transaction are dropped on the wire.
//!
//! Decoded batches are converted into the [`models`](super::models) types so
//! the decoder sees the same shape whichever transport delivered them.

use super::models;

/// gRPC method path of the server-streaming `GetTransactions` call.
pub const GET_TRANSACTIONS_PATH: &str = "/aptos.indexer.v1.RawData/GetTransactions";

// ============================================================================
// aptos.indexer.v1
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetTransactionsRequest {
    #[prost(uint64, optional, tag = "1")]
    pub starting_version: Option<u64>,
    #[prost(uint64, optional, tag = "2")]
    pub transactions_count: Option<u64>,
    #[prost(uint64, optional, tag = "3")]
    pub batch_size: Option<u64>,
}

impl From<&models::GetTransactionsRequest> for GetTransactionsRequest {
    fn from(request: &models::GetTransactionsRequest) -> Self {
        Self {
            starting_version: request.starting_version,
            transactions_count: request.transactions_count,
            batch_size: request.batch_size,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TransactionsResponse {
    #[prost(message, repeated, tag = "1")]
    pub transactions: Vec<Transaction>,
    #[prost(uint64, optional, tag = "2")]
    pub chain_id: Option<u64>,
}

// ============================================================================
// aptos.transaction.v1
// ============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct Transaction {
    #[prost(uint64, tag = "2")]
    pub version: u64,
    /// `TransactionType` enumeration value.
    #[prost(int32, tag = "6")]
    pub transaction_type: i32,
    #[prost(oneof = "TxnData", tags = "10")]
    pub txn_data: Option<TxnData>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum TxnData {
    #[prost(message, tag = "10")]
    User(UserTransaction),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserTransaction {
    #[prost(message, optional, tag = "1")]
    pub request: Option<UserTransactionRequest>,
    #[prost(message, repeated, tag = "2")]
    pub events: Vec<Event>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserTransactionRequest {
    #[prost(message, optional, tag = "6")]
    pub payload: Option<TransactionPayload>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TransactionPayload {
    #[prost(oneof = "Payload", tags = "2")]
    pub payload: Option<Payload>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "2")]
    EntryFunctionPayload(EntryFunctionPayload),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EntryFunctionPayload {
    #[prost(string, repeated, tag = "3")]
    pub arguments: Vec<String>,
    #[prost(string, tag = "4")]
    pub entry_function_id_str: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    #[prost(message, optional, tag = "1")]
    pub key: Option<EventKey>,
    #[prost(message, optional, tag = "3")]
    pub move_type: Option<MoveType>,
    #[prost(string, tag = "4")]
    pub data: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EventKey {
    #[prost(string, tag = "2")]
    pub account_address: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MoveType {
    #[prost(oneof = "MoveTypeContent", tags = "4")]
    pub content: Option<MoveTypeContent>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum MoveTypeContent {
    #[prost(message, tag = "4")]
    Struct(MoveStructTag),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MoveStructTag {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(string, tag = "2")]
    pub module: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

// ============================================================================
// Conversion into the wire model
// ============================================================================

fn transaction_type(value: i32) -> models::TransactionType {
    match value {
        0 => models::TransactionType::Unspecified,
        1 => models::TransactionType::Genesis,
        2 => models::TransactionType::BlockMetadata,
        3 => models::TransactionType::StateCheckpoint,
        4 => models::TransactionType::User,
        20 => models::TransactionType::Validator,
        21 => models::TransactionType::BlockEpilogue,
        _ => models::TransactionType::Unknown,
    }
}

impl From<TransactionsResponse> for models::TransactionsResponse {
    fn from(response: TransactionsResponse) -> Self {
        Self {
            chain_id: response.chain_id,
            transactions: response.transactions.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Transaction> for models::Transaction {
    fn from(transaction: Transaction) -> Self {
        let user = match transaction.txn_data {
            Some(TxnData::User(user)) => Some(user.into()),
            None => None,
        };
        Self {
            version: transaction.version,
            transaction_type: transaction_type(transaction.transaction_type),
            user,
        }
    }
}

impl From<UserTransaction> for models::UserTransaction {
    fn from(user: UserTransaction) -> Self {
        let payload = user
            .request
            .and_then(|request| request.payload)
            .map(|payload| models::TransactionPayload {
                entry_function_payload: payload.payload.map(|Payload::EntryFunctionPayload(entry)| {
                    models::EntryFunctionPayload {
                        entry_function_id_str: entry.entry_function_id_str,
                        arguments: entry.arguments,
                    }
                }),
            });

        Self {
            request: Some(models::UserTransactionRequest { payload }),
            events: user.events.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Event> for models::Event {
    fn from(event: Event) -> Self {
        let struct_tag = event.move_type.and_then(|move_type| match move_type.content {
            Some(MoveTypeContent::Struct(tag)) => Some(models::MoveStructTag {
                address: tag.address,
                module: tag.module,
                name: tag.name,
            }),
            None => None,
        });

        Self {
            key: event.key.map(|key| models::EventKey {
                account_address: key.account_address,
            }),
            event_type: models::MoveType { struct_tag },
            data: event.data,
        }
    }
}
