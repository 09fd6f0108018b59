//! Axum router construction.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/encode", post(handlers::encode))
        .route("/decode", post(handlers::decode))
        .route("/mask", post(handlers::mask))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(middleware::MAX_BODY_BYTES))
        .layer(from_fn(middleware::no_store))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use common::protocol::{DecodeResponse, EncodeResponse};
    use serde_json::json;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn health_route_exists() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    }

    #[tokio::test]
    async fn encode_then_decode() {
        let app = build(AppState::default());

        let resp = app
            .clone()
            .oneshot(post_json(
                "/encode",
                json!({
                    "model": "transaction",
                    "record_id": "42",
                    "fields": [{"name": "merchant", "kind": "text", "value": "Corner Grocery"}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let encoded: EncodeResponse = body_json(resp).await;
        let token = encoded.fields[0].token.clone().unwrap();

        let resp = app
            .oneshot(post_json(
                "/decode",
                json!({
                    "model": "transaction",
                    "record_id": "42",
                    "fields": [{"name": "merchant", "kind": "text", "token": token}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let decoded: DecodeResponse = body_json(resp).await;
        assert_eq!(decoded.fields[0].value.as_deref(), Some("Corner Grocery"));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = build(AppState::default());
        let text = "a".repeat(middleware::MAX_BODY_BYTES + 1);
        let resp = app
            .oneshot(post_json("/mask", json!({ "text": text })))
            .await
            .unwrap();
        assert_eq!(resp.status(), 413);
    }
}
