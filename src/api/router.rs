use axum::{middleware, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::admin;
use super::health;
use super::middleware::gatekeeper::gatekeeper;
use super::state::AppState;
use super::v1;

/// Create the full router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    // The gatekeeper fronts the data plane only; management routes carry
    // their own session auth, health probes are open.
    let data_plane = v1::create_v1_router()
        .layer(middleware::from_fn_with_state(state.clone(), gatekeeper));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        .nest("/v1", data_plane)
        .nest("/admin", admin::create_admin_router().layer(CorsLayer::permissive()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::api::middleware::SessionAuth;
    use crate::infrastructure::api_key::generator::test_support::fast_generator;
    use crate::infrastructure::api_key::{ApiKeyService, Environment, InMemoryApiKeyRepository};
    use crate::infrastructure::usage::{InMemoryUsageRepository, UsageRecorder};

    fn app() -> Router {
        let service = Arc::new(ApiKeyService::new(
            Arc::new(InMemoryApiKeyRepository::new()),
            fast_generator(Environment::Test),
        ));
        let usage = Arc::new(InMemoryUsageRepository::default());
        let recorder = UsageRecorder::spawn(usage.clone(), chrono::Duration::days(90));

        let state = AppState::new(
            service,
            usage,
            recorder,
            Arc::new(SessionAuth::new("test-secret")),
        );

        create_router_with_state(state)
    }

    #[tokio::test]
    async fn test_health_endpoints_are_open() {
        for path in ["/health", "/ready", "/live"] {
            let response = app()
                .oneshot(
                    axum::http::Request::builder()
                        .uri(path)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK, "path {}", path);
        }
    }

    #[tokio::test]
    async fn test_data_plane_is_gated() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/v1/symbols")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_requires_session_not_api_key() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/admin/keys")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
