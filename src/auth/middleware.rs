use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;

use super::{extract_bearer_token, AuthError, TokenVerifier};
use crate::observability::Metrics;

/// State shared by the authentication route layer
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,
    pub metrics: Arc<Metrics>,
}

/// Reject requests without a valid bearer token; otherwise insert the
/// [`Caller`](super::Caller) into the request extensions for handlers.
pub async fn require_token(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let verified = extract_bearer_token(request.headers())
        .and_then(|token| state.verifier.verify(token));

    match verified {
        Ok(caller) => {
            tracing::Span::current().record("user.id", caller.id.as_str());
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => {
            crate::warn_with_trace!(
                reason = err.reason(),
                path = %request.uri().path(),
                "Rejected unauthenticated request"
            );
            state.metrics.record_auth_failure(err.reason());
            unauthorized(&err)
        }
    }
}

fn unauthorized(err: &AuthError) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": err.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response();

    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Caller;
    use crate::models::UserId;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn state() -> AuthState {
        AuthState {
            verifier: Arc::new(TokenVerifier::new("test-secret", 0).unwrap()),
            metrics: Arc::new(Metrics::new().unwrap()),
        }
    }

    fn app(state: AuthState) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(caller): Extension<Caller>| async move {
                    caller.id.to_string()
                }),
            )
            .route_layer(middleware::from_fn_with_state(state, require_token))
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let state = state();
        let token = state
            .verifier
            .issue(&UserId::parse("user-a").unwrap(), chrono::Duration::minutes(5))
            .unwrap();

        let request = Request::builder()
            .uri("/whoami")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();

        let response = app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"user-a");
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let state = state();
        let metrics = state.metrics.clone();

        let request = Request::builder()
            .uri("/whoami")
            .body(Body::empty())
            .unwrap();

        let response = app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
        assert_eq!(
            metrics
                .auth_failures_total
                .with_label_values(&["missing_token"])
                .get(),
            1.0
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Missing Authorization header");
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let request = Request::builder()
            .uri("/whoami")
            .header("authorization", "Bearer nonsense")
            .body(Body::empty())
            .unwrap();

        let response = app(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
