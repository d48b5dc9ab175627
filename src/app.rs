use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;

use crate::auth::{require_token, AuthState, TokenVerifier};
use crate::config::ServerConfig;
use crate::handlers::{
    create_pets_router, cors_middleware, health_check, request_validation_middleware,
    security_headers_middleware,
};
use crate::observability::{metrics_handler, observability_middleware, Metrics};
use crate::services::PetService;

/// Build the application router.
///
/// `/pets` routes require a bearer token; `/health/status` and `/metrics` do not.
pub fn create_app(
    pet_service: Arc<PetService>,
    verifier: Arc<TokenVerifier>,
    metrics: Arc<Metrics>,
    server: &ServerConfig,
) -> Router {
    let auth_state = AuthState {
        verifier,
        metrics: metrics.clone(),
    };

    // Route layers: the last one added runs first, so authentication precedes body checks
    let pets = create_pets_router(pet_service, metrics.clone())
        .route_layer(middleware::from_fn_with_state(
            server.max_request_size,
            request_validation_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(auth_state, require_token));

    // Layers: the last one added is the outermost
    Router::new()
        .route("/health/status", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics.clone())
        .merge(pets)
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(middleware::from_fn_with_state(
            metrics,
            observability_middleware,
        ))
        .layer(middleware::from_fn(cors_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}
