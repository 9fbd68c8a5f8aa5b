use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::visits::VisitError;

/// Bodies stay minimal: no secret, fingerprint or store detail is ever echoed.
impl IntoResponse for VisitError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            VisitError::Unauthorized => (StatusCode::FORBIDDEN, "Forbidden"),
            VisitError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Visit not recorded, try again later",
            ),
            VisitError::CountIncomplete(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Visit may be partially recorded, try again later",
            ),
            VisitError::TotalsUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Visit totals unavailable, try again later",
            ),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
