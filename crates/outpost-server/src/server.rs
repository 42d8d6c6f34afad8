// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger server built on axum.
//!
//! Sets up routes, middleware, and shared state. Every cycle endpoint runs a
//! single pass and returns its summary, so an external timer (cron, systemd,
//! a cloud scheduler) drives the pipeline.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use outpost_bus::EventBus;
use outpost_config::OutpostConfig;
use outpost_core::{GatewayClient, OutpostError};
use outpost_dispatch::Dispatcher;
use outpost_followup::FollowupCycle;
use outpost_ingest::Ingestor;
use outpost_storage::Database;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// State for unauthenticated health checks.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<OutpostConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub ingestor: Arc<Ingestor>,
    pub followups: Arc<FollowupCycle>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

impl AppState {
    pub fn new(
        db: Database,
        bus: EventBus,
        gateway: Arc<dyn GatewayClient>,
        config: OutpostConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(db.clone(), gateway, bus.clone(), config.dispatch.clone());
        let ingestor = Ingestor::new(db.clone(), bus.clone(), config.ingest.max_retries);
        let followups = FollowupCycle::new(db.clone(), bus, &config.followup, &config.dispatch);
        Self {
            auth: AuthConfig {
                bearer_token: config.server.bearer_token.clone(),
            },
            db,
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            ingestor: Arc::new(ingestor),
            followups: Arc::new(followups),
            health: HealthState {
                start_time: std::time::Instant::now(),
            },
        }
    }
}

/// Build the application router.
///
/// - GET /health (public)
/// - POST /webhooks/{channel_id} (public, provider callbacks)
/// - POST /v1/dispatch, /v1/ingest, /v1/followups/run (bearer auth)
/// - POST /v1/followups/{id}/cancel (bearer auth)
/// - POST /v1/conversations/{id}/messages (bearer auth)
pub fn build_router(state: AppState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webhooks/{channel_id}", post(handlers::post_webhook))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/dispatch", post(handlers::post_dispatch))
        .route("/v1/ingest", post(handlers::post_ingest))
        .route("/v1/followups/run", post(handlers::post_followups_run))
        .route("/v1/followups/{id}/cancel", post(handlers::post_cancel_followup))
        .route(
            "/v1/conversations/{id}/messages",
            post(handlers::post_conversation_message),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Bind `host:port` and serve until `cancel` fires.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn start_server(
    host: &str,
    port: u16,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), OutpostError> {
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| OutpostError::Config(format!("failed to bind server to {addr}: {e}")))?;

    tracing::info!("trigger server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| OutpostError::Internal(format!("server error: {e}")))?;

    tracing::info!("trigger server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use chrono::Utc;
    use http::{Request, StatusCode};
    use outpost_core::{
        Direction, FollowupRule, FollowupScenario, FollowupStatus, OutboxStatus,
    };
    use outpost_storage::queries::{followups, outbox, webhook_events};
    use outpost_test_utils::{TENANT, TestHarness};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn router(h: &TestHarness, token: Option<&str>) -> Router {
        let mut config = h.config.clone();
        config.server.bearer_token = token.map(str::to_string);
        let gateway: Arc<dyn GatewayClient> = h.gateway.clone();
        build_router(AppState::new(h.db.clone(), h.bus.clone(), gateway, config))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = TestHarness::new().await.unwrap();
        let response = router(&h, None)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn api_rejects_missing_or_wrong_token() {
        let h = TestHarness::new().await.unwrap();

        let response = router(&h, Some(TOKEN))
            .oneshot(Request::post("/v1/dispatch").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router(&h, Some("other-token"))
            .oneshot(post("/v1/dispatch", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // No token configured fails closed.
        let response = router(&h, None)
            .oneshot(post("/v1/dispatch", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_is_stored_with_normalized_kind() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let payload = json!({"event": "MESSAGES_UPSERT", "data": {"key": {"id": "P1"}}});

        let response = router(&h, None)
            .oneshot(post("/webhooks/ch-1", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["event_kind"], "messages.upsert");

        let id = body["id"].as_i64().unwrap();
        let event = webhook_events::get_event(&h.db, id).await.unwrap().unwrap();
        assert_eq!(event.tenant_id, TENANT);
        assert_eq!(event.event_kind, "messages.upsert");
        assert_eq!(serde_json::from_str::<Value>(&event.payload).unwrap(), payload);
    }

    #[tokio::test]
    async fn webhook_for_unknown_channel_is_404() {
        let h = TestHarness::new().await.unwrap();
        let response = router(&h, None)
            .oneshot(post("/webhooks/nope", json!({"event": "messages.upsert"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_send_then_dispatch() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let conv = h.seed_conversation("ch-1", "5511999990000", None).await.unwrap();
        let app = router(&h, Some(TOKEN));

        let response = app
            .clone()
            .oneshot(post(
                &format!("/v1/conversations/{}/messages", conv.id),
                json!({"content": "Bom dia!"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let item_id = body["outbox_item"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["message"]["status"], "pending");

        let response = app.oneshot(post("/v1/dispatch", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["sent"], 1);

        let item = outbox::get_item(&h.db, &item_id).await.unwrap().unwrap();
        assert_eq!(item.status, OutboxStatus::Sent);
        assert_eq!(h.gateway.send_count().await, 1);
    }

    #[tokio::test]
    async fn manual_send_validates_body_and_conversation() {
        let h = TestHarness::new().await.unwrap();
        let app = router(&h, Some(TOKEN));

        let response = app
            .clone()
            .oneshot(post("/v1/conversations/missing/messages", json!({"content": "oi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post(
                "/v1/conversations/missing/messages",
                json!({"kind": "image"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ingest_endpoint_processes_stored_webhooks() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let app = router(&h, Some(TOKEN));
        app.clone()
            .oneshot(post(
                "/webhooks/ch-1",
                json!({"event": "connection.update", "data": {"state": "close"}}),
            ))
            .await
            .unwrap();

        let response = app.oneshot(post("/v1/ingest", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body, json!({"processed": 1, "errors": 0}));
    }

    #[tokio::test]
    async fn cancel_followup_statuses() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let conv = h.seed_conversation("ch-1", "5511999990000", None).await.unwrap();
        h.seed_message(&conv, Direction::Inbound, "oi", Utc::now() - chrono::Duration::hours(3))
            .await
            .unwrap();
        followups::create_rule(
            &h.db,
            &FollowupRule {
                id: "r-1".into(),
                tenant_id: TENANT.into(),
                name: "team silent".into(),
                statuses: Vec::new(),
                scenario: FollowupScenario::TeamSilent,
                stale_threshold_minutes: 60,
                max_attempts: 1,
                auto_send: false,
                template: None,
                active: true,
                created_at: "2026-01-01T00:00:00.000Z".into(),
            },
        )
        .await
        .unwrap();
        let app = router(&h, Some(TOKEN));

        let response = app
            .clone()
            .oneshot(post("/v1/followups/run", json!({})))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["created"], 1);
        assert_eq!(body["dispatch_triggered"], false);

        let task = followups::tasks_for_rule(&h.db, "r-1", &[conv.id.clone()])
            .await
            .unwrap()
            .remove(0);
        let uri = format!("/v1/followups/{}/cancel", task.id);

        let response = app.clone().oneshot(post(&uri, json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task = followups::get_task(&h.db, &task.id).await.unwrap().unwrap();
        assert_eq!(task.status, FollowupStatus::Cancelled);

        let response = app.clone().oneshot(post(&uri, json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(post("/v1/followups/unknown/cancel", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
