//! Snapshot read endpoint.
//!
//! Lets a reconnecting editor (or an export job) fetch the materialized
//! document state without replaying the full log over the socket.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use tracing::instrument;
use uuid::Uuid;

use storyloom_core::error::SyncError;
use storyloom_core::store::Snapshot;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /{document_id}/snapshot
#[instrument(skip(state))]
async fn get_snapshot(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Snapshot>, ApiError> {
    let host = state.registry.get(document_id).ok_or_else(|| {
        SyncError::ValidationFailed(format!("document {document_id} is not hosted"))
    })?;
    let snapshot = host.snapshot()?;
    Ok(Json(snapshot))
}

/// Returns the snapshot router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{document_id}/snapshot", get(get_snapshot))
}
