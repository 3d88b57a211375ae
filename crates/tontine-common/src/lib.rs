//! Tontine Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the tontine processor.
//!
//! # Overview
//!
//! - **Addresses**: canonical account address form used as table keys
//! - **Types**: membership and state rows plus the mutations applied to them
//! - **Error Handling**: shared error and result types
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```
//! use tontine_common::address::normalize_address;
//!
//! assert_eq!(normalize_address("abc"), "0xabc");
//! assert_eq!(normalize_address("0xabc"), "0xabc");
//! ```

pub mod address;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use address::normalize_address;
pub use error::{CommonError, Result};
