//! Edge origin verification.
//!
//! The edge layer injects a shared secret into every request it forwards.
//! Requests without it never reach the visit handler.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::OriginConfig;
use crate::visits::VisitError;

pub struct OriginVerifier {
    header: String,
    /// Only the digest is kept so comparisons are fixed-length
    secret_digest: [u8; 32],
}

impl OriginVerifier {
    pub fn new(header: &str, secret: &str) -> Self {
        Self {
            header: header.to_lowercase(),
            secret_digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    pub fn from_config(config: &OriginConfig) -> Self {
        Self::new(&config.header, config.secret.expose())
    }

    pub fn header_name(&self) -> &str {
        &self.header
    }

    /// Constant-time check of the secret header; neither content nor length leaks
    pub fn verify(&self, headers: &HeaderMap) -> bool {
        let Some(presented) = headers.get(self.header.as_str()) else {
            return false;
        };

        let presented_digest: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        presented_digest[..].ct_eq(&self.secret_digest[..]).into()
    }
}

pub async fn origin_middleware(
    verifier: Arc<OriginVerifier>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if verifier.verify(&headers) {
        next.run(request).await
    } else {
        warn!(
            header = verifier.header_name(),
            present = headers.contains_key(verifier.header_name()),
            "rejected request without a valid origin token"
        );
        VisitError::Unauthorized.into_response()
    }
}
