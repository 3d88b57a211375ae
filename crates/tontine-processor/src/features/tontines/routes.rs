//! Tontine API routes
//!
//! Responses are plain JSON bodies (no envelope) so existing frontends can
//! consume them directly.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::queries::{
    get_member_tontines, get_tontine, GetMemberTontinesError, GetMemberTontinesQuery,
    GetTontineError, GetTontineQuery, GetTontineResponse, MemberTontineResponse,
};
use crate::db::Store;
use crate::error::AppError;

pub fn tontines_routes() -> Router<Arc<dyn Store>> {
    Router::new()
        .route("/tontines/:member_address", get(get_member_tontines_handler))
        .route("/tontine/:tontine_address", get(get_tontine_handler))
}

/// `GET /tontines/:member_address`
///
/// - `200 OK` - JSON array ordered by tontine address (possibly empty)
/// - `400 Bad Request` - address is not hex
#[tracing::instrument(skip(store))]
async fn get_member_tontines_handler(
    State(store): State<Arc<dyn Store>>,
    Path(member_address): Path<String>,
) -> Result<Json<Vec<MemberTontineResponse>>, AppError> {
    let query = GetMemberTontinesQuery { member_address };
    let tontines = get_member_tontines::handle(store.as_ref(), query).await?;
    Ok(Json(tontines))
}

/// `GET /tontine/:tontine_address`
///
/// - `200 OK` - state and members
/// - `400 Bad Request` - address is not hex
/// - `404 Not Found` - no state row and no members
#[tracing::instrument(skip(store))]
async fn get_tontine_handler(
    State(store): State<Arc<dyn Store>>,
    Path(tontine_address): Path<String>,
) -> Result<Json<GetTontineResponse>, AppError> {
    let query = GetTontineQuery { tontine_address };
    let tontine = get_tontine::handle(store.as_ref(), query).await?;
    Ok(Json(tontine))
}

impl From<GetMemberTontinesError> for AppError {
    fn from(err: GetMemberTontinesError) -> Self {
        match err {
            GetMemberTontinesError::InvalidAddress(_) => AppError::Validation(err.to_string()),
            GetMemberTontinesError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<GetTontineError> for AppError {
    fn from(err: GetTontineError) -> Self {
        match err {
            GetTontineError::InvalidAddress(_) => AppError::Validation(err.to_string()),
            GetTontineError::NotFound(_) => AppError::NotFound(err.to_string()),
            GetTontineError::Database(e) => AppError::Database(e),
        }
    }
}
