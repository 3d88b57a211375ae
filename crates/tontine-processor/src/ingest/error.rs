//! Ingestion error types
//!
//! Every variant of [`IngestError`] is fatal to the ingestion loop. Recovery
//! is a process restart, which resumes from the persisted checkpoint.

use thiserror::Error;

use crate::db::DbError;

/// Upstream broke the ordering contract of the stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("Chain ID mismatch. Expected chain ID is: {expected}, but received chain ID is: {}", display_chain_id(.actual))]
    ChainIdMismatch { expected: u64, actual: Option<u64> },

    #[error("Transaction version mismatch. Expected transaction version is: {expected}, but received transaction version is: {actual}")]
    VersionMismatch { expected: u64, actual: u64 },
}

fn display_chain_id(chain_id: &Option<u64>) -> String {
    chain_id.map_or_else(|| "none".to_string(), |id| id.to_string())
}

/// A recognized contract event or call could not be interpreted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed payload for {event_type}: {reason}")]
    MalformedPayload { event_type: String, reason: String },

    #[error("{event_type} has no event key")]
    MissingEventKey { event_type: String },

    #[error("Malformed destroy argument: {reason}")]
    MalformedDestroyArgument { reason: String },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    #[error("Failed to decode transaction {version}: {source}")]
    Decode {
        version: u64,
        #[source]
        source: DecodeError,
    },

    #[error("Failed to apply transaction {version}: {source}")]
    StoreWrite {
        version: u64,
        #[source]
        source: DbError,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[source] DbError),

    #[error("Transaction stream error: {0}")]
    Stream(String),

    #[error("Version {0} does not fit the checkpoint column")]
    VersionOutOfRange(u64),
}

impl IngestError {
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Version the error is attached to, when there is one.
    pub fn version(&self) -> Option<u64> {
        match self {
            IngestError::ProtocolViolation(ProtocolViolation::VersionMismatch { actual, .. }) => {
                Some(*actual)
            },
            IngestError::Decode { version, .. } | IngestError::StoreWrite { version, .. } => {
                Some(*version)
            },
            IngestError::VersionOutOfRange(version) => Some(*version),
            _ => None,
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
