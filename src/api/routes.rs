//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    health, openapi, opportunities, prometheus_metrics, ready, status, AppState,
};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(prometheus_metrics))
        // Scan results
        .route("/api/v1/status", get(status))
        .route("/api/v1/opportunities", get(opportunities))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(AppState::new());
        assert_eq!(get_status(app, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_when_not_ready() {
        let app = create_router(AppState::new());
        assert_eq!(get_status(app, "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_200_when_ready() {
        let state = AppState::new();
        state.set_ready(true);
        let app = create_router(state);

        assert_eq!(get_status(app, "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn opportunities_endpoint_returns_json_array() {
        let app = create_router(AppState::new());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/opportunities")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[tokio::test]
    async fn metrics_and_docs_are_served() {
        let state = AppState::new();
        assert_eq!(get_status(create_router(state.clone()), "/metrics").await, StatusCode::OK);
        assert_eq!(
            get_status(create_router(state), "/api-docs/openapi.json").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = create_router(AppState::new());
        assert_eq!(get_status(app, "/nope").await, StatusCode::NOT_FOUND);
    }
}
