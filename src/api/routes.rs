use axum::{
    http::{header::HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{origin_middleware, OriginVerifier};
use crate::config::CorsConfig;

use super::handlers::{health_check, record_visit, AppState};

pub const VISIT_PATH: &str = "/api/visit";

pub fn create_api_router(
    state: AppState,
    verifier: Arc<OriginVerifier>,
    cors: &CorsConfig,
) -> Router {
    let state = Arc::new(state);

    let protected_routes = Router::new()
        .route(VISIT_PATH, get(record_visit).post(record_visit))
        .route_layer(middleware::from_fn(move |headers, req, next| {
            let verifier = Arc::clone(&verifier);
            origin_middleware(verifier, headers, req, next)
        }))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors))
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origin = match cors
        .allowed_origin
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok())
    {
        Some(value) => AllowOrigin::exact(value),
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .max_age(Duration::from_secs(24 * 60 * 60))
}
