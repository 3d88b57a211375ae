//! Feature modules implementing the query API
//!
//! Each feature is a vertical slice with its own `queries/` and `routes.rs`.
//! The API is read-only, so there are no command slices.
//!
//! # Features
//!
//! - **tontines**: membership and state lookups by member or tontine address

pub mod tontines;

use axum::Router;
use std::sync::Arc;

use crate::db::Store;

/// Creates the router with all feature routes mounted
pub fn router(store: Arc<dyn Store>) -> Router<()> {
    Router::new().merge(tontines::tontines_routes().with_state(store))
}
