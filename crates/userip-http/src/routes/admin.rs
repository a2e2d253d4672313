//! Admin endpoints.

use axum::extract::{Json, State};

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::FlushResponse;

/// Forces a snapshot write regardless of the dirty flag.
///
/// A failure leaves the store dirty; the caller may retry.
pub async fn flush(State(state): State<AppState>) -> Result<Json<FlushResponse>, ApiError> {
    let written = state.flush(true).await.map_err(|e| {
        tracing::error!(error = %e, "Forced flush failed");
        ApiError::from(e)
    })?;
    Ok(Json(FlushResponse { written }))
}
