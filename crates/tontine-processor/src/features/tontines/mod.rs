//! Tontine lookups
//!
//! - `GET /tontines/:member_address` - tontines a member belongs to
//! - `GET /tontine/:tontine_address` - state and members of one tontine

pub mod queries;
pub mod routes;

pub use routes::tontines_routes;
