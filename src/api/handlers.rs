use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::config::HeaderNames;
use crate::visits::{VisitError, VisitOutcome, VisitRecorder, VisitorAttributes};

pub struct AppState {
    pub recorder: Arc<VisitRecorder>,
    pub headers: HeaderNames,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Count the visit if it is new, then report current totals.
///
/// Only reachable after origin verification has passed.
pub async fn record_visit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<VisitOutcome>, VisitError> {
    let visitor = VisitorAttributes::from_headers(&headers, &state.headers);
    let outcome = state.recorder.record(&visitor).await?;

    tracing::debug!(
        status = ?outcome.status,
        country = %outcome.visitor.country,
        device = %outcome.visitor.device,
        total = outcome.totals.total,
        "visit handled"
    );

    Ok(Json(outcome))
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
