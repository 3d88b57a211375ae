//! Error types shared across the tontine crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while building or converting shared domain values
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommonError {
    #[error("Invalid tontine state discriminant: {0}")]
    InvalidState(i64),
}
