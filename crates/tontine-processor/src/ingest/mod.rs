//! Transaction ingestion pipeline
//!
//! # Architecture
//!
//! - **models**: serde model of the upstream transaction stream
//! - **stream**: [`TransactionSource`] and the JSON-over-HTTP implementation
//! - **grpc**: the gRPC implementation used against indexers
//! - **proto**: protobuf messages of the indexer's `RawData` service
//! - **decoder**: transaction → [`TontineMutations`](tontine_common::types::TontineMutations)
//! - **materializer**: applies one version's mutations plus the checkpoint atomically
//! - **checkpoint**: starting version resolution
//! - **processor**: the ingestion loop tying the above together

pub mod checkpoint;
pub mod decoder;
pub mod error;
pub mod grpc;
pub mod materializer;
pub mod models;
pub mod processor;
pub mod proto;
pub mod stream;

pub use checkpoint::{resolve_starting_version, ResolvedStart, StartSource, StartingVersionConfig};
pub use decoder::{decode, ContractTarget};
pub use error::{DecodeError, IngestError, IngestResult, ProtocolViolation};
pub use grpc::GrpcTransactionSource;
pub use materializer::Materializer;
pub use processor::{ProcessorConfig, ProcessorExit, ProcessorState, TontineProcessor};
pub use stream::{HttpTransactionSource, TransactionSource, TransactionStream};
