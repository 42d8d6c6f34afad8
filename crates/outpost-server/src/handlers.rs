// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the trigger API and webhook receiver.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use outpost_core::{Message, MessageKind, NewOutboundMessage, OutboxItem, OutpostError};
use outpost_dispatch::DispatchSummary;
use outpost_followup::FollowupSummary;
use outpost_ingest::{IngestSummary, normalize_kind};
use outpost_storage::CancelOutcome;
use outpost_storage::queries::{channels, followups, outbox, webhook_events};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::server::AppState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error carrying the HTTP status to answer with.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<OutpostError> for ApiError {
    fn from(e: OutpostError) -> Self {
        match e {
            OutpostError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            OutpostError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            other => {
                error!(error = %other, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub database: &'static str,
}

/// GET /health
///
/// Unauthenticated. Answers 503 when the database cannot be reached.
pub async fn get_health(State(state): State<AppState>) -> Response {
    let database = match state.db.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "health check could not reach the database");
            "unreachable"
        }
    };
    let (code, status) = if database == "ok" {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        database,
    };
    (code, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
pub struct WebhookAccepted {
    pub id: i64,
    pub event_kind: String,
}

/// POST /webhooks/{channel_id}
///
/// Stores the raw callback for the next ingest cycle.
pub async fn post_webhook(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<WebhookAccepted>), ApiError> {
    let channel = channels::get_channel(&state.db, &channel_id)
        .await?
        .ok_or(OutpostError::NotFound {
            entity: "channel",
            id: channel_id,
        })?;

    let event_kind = body
        .get("event")
        .and_then(|v| v.as_str())
        .map(normalize_kind)
        .unwrap_or_else(|| "unknown".to_string());
    let id = webhook_events::append_event(
        &state.db,
        &channel.tenant_id,
        &channel.id,
        &event_kind,
        &body.to_string(),
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(WebhookAccepted { id, event_kind })))
}

/// POST /v1/dispatch
pub async fn post_dispatch(
    State(state): State<AppState>,
) -> Result<Json<DispatchSummary>, ApiError> {
    let cfg = &state.config.dispatch;
    let summary = state
        .dispatcher
        .run_dispatch_cycle(cfg.max_channels, cfg.items_per_channel)
        .await?;
    Ok(Json(summary))
}

/// POST /v1/ingest
pub async fn post_ingest(State(state): State<AppState>) -> Result<Json<IngestSummary>, ApiError> {
    let summary = state
        .ingestor
        .run_ingest_cycle(state.config.ingest.batch_size)
        .await?;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct FollowupRunResponse {
    #[serde(flatten)]
    pub summary: FollowupSummary,
    /// Whether a dispatch cycle was started for the auto-sent messages.
    pub dispatch_triggered: bool,
}

/// POST /v1/followups/run
///
/// Runs reconcile then schedule. When messages were auto-sent and
/// `followup.trigger_dispatch` is set, a dispatch cycle is spawned without
/// waiting for it.
pub async fn post_followups_run(
    State(state): State<AppState>,
) -> Result<Json<FollowupRunResponse>, ApiError> {
    let summary = state.followups.run_followup_cycle().await?;

    let dispatch_triggered = state.config.followup.trigger_dispatch && summary.sent > 0;
    if dispatch_triggered {
        let dispatcher = state.dispatcher.clone();
        let max_channels = state.config.dispatch.max_channels;
        let items_per_channel = state.config.dispatch.items_per_channel;
        tokio::spawn(async move {
            match dispatcher.run_dispatch_cycle(max_channels, items_per_channel).await {
                Ok(s) => info!(sent = s.sent, failed = s.failed, "follow-up dispatch finished"),
                Err(e) => warn!(error = %e, "follow-up dispatch failed"),
            }
        });
    }

    Ok(Json(FollowupRunResponse {
        summary,
        dispatch_triggered,
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub id: String,
    pub status: &'static str,
}

/// POST /v1/followups/{id}/cancel
pub async fn post_cancel_followup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    match followups::cancel_task(&state.db, &id, Utc::now()).await? {
        CancelOutcome::Cancelled => Ok(Json(CancelResponse {
            id,
            status: "cancelled",
        })),
        CancelOutcome::NotFound => Err(OutpostError::NotFound {
            entity: "follow-up task",
            id,
        }
        .into()),
        CancelOutcome::AlreadyTerminal => Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("follow-up task {id} is already responded or cancelled"),
        )),
    }
}

/// Request body for POST /v1/conversations/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

impl SendMessageRequest {
    fn validate(&self) -> Result<(), OutpostError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !self.kind.is_sendable() {
            return Err(OutpostError::Validation(format!(
                "{} messages cannot be sent",
                self.kind
            )));
        }
        if self.kind == MessageKind::Text && !present(&self.content) {
            return Err(OutpostError::Validation("text message needs content".into()));
        }
        if self.kind != MessageKind::Text && !present(&self.media_url) {
            return Err(OutpostError::Validation(format!(
                "{} message needs a media_url",
                self.kind
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct QueuedMessage {
    pub message: Message,
    pub outbox_item: OutboxItem,
}

/// POST /v1/conversations/{id}/messages
///
/// Queues an outbound message; delivery happens in the next dispatch cycle.
pub async fn post_conversation_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<QueuedMessage>), ApiError> {
    body.validate()?;
    let (message, outbox_item) = outbox::enqueue_message(
        &state.db,
        &NewOutboundMessage {
            conversation_id,
            kind: body.kind,
            content: body.content,
            media_url: body.media_url,
            file_name: body.file_name,
            max_retries: state.config.dispatch.max_retries,
        },
        Utc::now(),
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(QueuedMessage {
            message,
            outbox_item,
        }),
    ))
}
