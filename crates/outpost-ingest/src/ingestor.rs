// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The webhook ingest cycle.

use chrono::{DateTime, Utc};
use outpost_bus::{EventBus, EventKind};
use outpost_core::time::{from_unix_seconds, parse_timestamp};
use outpost_core::{Direction, MessageStatus, OutpostError, WebhookEvent};
use outpost_storage::queries::{channels, conversations, messages, webhook_events};
use outpost_storage::{Database, IncomingMessage, RecordOutcome};
use outpost_whatsapp::normalize_recipient;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::events::{
    ConnectionData, ContactData, IngestEvent, MessageData, StatusData, is_broadcast,
};

const PREVIEW_CHARS: usize = 120;

/// Counts reported by one ingest cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Events marked processed.
    pub processed: usize,
    /// Events whose handler failed this cycle.
    pub errors: usize,
}

/// Applies stored webhook events to conversations, messages, and channels.
pub struct Ingestor {
    db: Database,
    bus: EventBus,
    max_retries: u32,
}

impl Ingestor {
    /// `max_retries` is the ceiling past which failing events stay unprocessed.
    pub fn new(db: Database, bus: EventBus, max_retries: u32) -> Self {
        Self {
            db,
            bus,
            max_retries,
        }
    }

    /// Process up to `batch_size` pending events, oldest first.
    pub async fn run_ingest_cycle(&self, batch_size: usize) -> Result<IngestSummary, OutpostError> {
        let events = webhook_events::fetch_pending(&self.db, batch_size, self.max_retries).await?;
        let mut summary = IngestSummary::default();

        for event in &events {
            let now = Utc::now();
            match self.handle(event, now).await {
                Ok(()) => match webhook_events::mark_processed(&self.db, event.id, now).await {
                    Ok(()) => summary.processed += 1,
                    Err(e) => {
                        summary.errors += 1;
                        warn!(event_id = event.id, error = %e, "failed to mark webhook event processed");
                    }
                },
                Err(e) => {
                    summary.errors += 1;
                    let error = e.to_string();
                    warn!(
                        event_id = event.id,
                        event_kind = %event.event_kind,
                        retry_count = event.retry_count + 1,
                        error = %error,
                        "webhook event failed"
                    );
                    if let Err(e) = webhook_events::record_failure(&self.db, event.id, &error).await
                    {
                        warn!(event_id = event.id, error = %e, "failed to record webhook event failure");
                    }
                    self.bus.publish(
                        &event.tenant_id,
                        EventKind::WebhookFailed {
                            event_id: event.id,
                            channel_id: event.channel_id.clone(),
                            event_kind: event.event_kind.clone(),
                            error,
                        },
                    );
                }
            }
        }

        info!(
            fetched = events.len(),
            processed = summary.processed,
            errors = summary.errors,
            "ingest cycle complete"
        );
        Ok(summary)
    }

    async fn handle(&self, event: &WebhookEvent, now: DateTime<Utc>) -> Result<(), OutpostError> {
        let parsed = IngestEvent::parse(&event.event_kind, &event.payload).map_err(|e| {
            OutpostError::Validation(format!("malformed {} payload: {e}", event.event_kind))
        })?;

        match parsed {
            IngestEvent::MessageUpsert(items) => {
                let received_at = parse_timestamp(&event.created_at).unwrap_or(now);
                for data in &items {
                    self.upsert_message(event, data, received_at).await?;
                }
            }
            IngestEvent::MessageStatus(items) => {
                for data in &items {
                    self.apply_status(event, data, now).await?;
                }
            }
            IngestEvent::ConnectionState(data) => self.apply_connection(event, &data, now).await?,
            IngestEvent::ContactUpsert(items) => {
                for data in &items {
                    self.apply_contact(event, data, now).await?;
                }
            }
            IngestEvent::Unknown(kind) => debug!(event_id = event.id, kind, "ignoring event kind"),
        }
        Ok(())
    }

    async fn upsert_message(
        &self,
        event: &WebhookEvent,
        data: &MessageData,
        received_at: DateTime<Utc>,
    ) -> Result<(), OutpostError> {
        let jid = &data.key.remote_jid;
        if is_broadcast(jid) {
            debug!(event_id = event.id, jid, "skipping broadcast message");
            return Ok(());
        }
        let Ok(remote_address) = normalize_recipient(jid) else {
            debug!(event_id = event.id, jid, "skipping message without usable address");
            return Ok(());
        };

        let (direction, status) = if data.key.from_me {
            (Direction::Outbound, MessageStatus::Sent)
        } else {
            (Direction::Inbound, MessageStatus::Delivered)
        };
        let extracted = data.extract();
        let preview = extracted
            .content
            .as_deref()
            .map(|c| c.chars().take(PREVIEW_CHARS).collect())
            .or_else(|| Some(format!("[{}]", extracted.kind)));
        let occurred_at = occurred_at(
            data.message_timestamp
                .as_ref()
                .and_then(|t| t.as_secs())
                .and_then(from_unix_seconds),
            received_at,
        );

        let outcome = messages::record_incoming_message(
            &self.db,
            IncomingMessage {
                tenant_id: event.tenant_id.clone(),
                channel_id: event.channel_id.clone(),
                remote_address,
                direction,
                kind: extracted.kind,
                content: extracted.content,
                media_url: extracted.media_url,
                status,
                provider_message_id: data.key.id.clone().filter(|id| !id.is_empty()),
                display_name: data.push_name.clone().filter(|n| !n.trim().is_empty()),
                preview,
                occurred_at,
            },
        )
        .await?;

        match outcome {
            RecordOutcome::Duplicate => {
                debug!(event_id = event.id, provider_message_id = ?data.key.id, "duplicate message");
            }
            RecordOutcome::Inserted {
                conversation_id,
                created_conversation,
                ..
            } => {
                debug!(event_id = event.id, conversation_id, created_conversation, %direction, "message recorded");
            }
        }
        Ok(())
    }

    async fn apply_status(
        &self,
        event: &WebhookEvent,
        data: &StatusData,
        now: DateTime<Utc>,
    ) -> Result<(), OutpostError> {
        let (Some(provider_id), Some(status)) = (data.provider_message_id(), data.status()) else {
            debug!(event_id = event.id, "status update without id or known code");
            return Ok(());
        };
        let changed =
            messages::update_status_by_provider_id(&self.db, &event.channel_id, provider_id, status, now)
                .await?;
        if !changed {
            debug!(event_id = event.id, provider_id, %status, "status update matched no advancing message");
        }
        Ok(())
    }

    async fn apply_connection(
        &self,
        event: &WebhookEvent,
        data: &ConnectionData,
        now: DateTime<Utc>,
    ) -> Result<(), OutpostError> {
        let status = data.channel_status();
        if channels::update_channel_status(&self.db, &event.channel_id, status, now).await? {
            info!(channel_id = %event.channel_id, %status, "channel state changed");
        } else {
            debug!(channel_id = %event.channel_id, "connection update for unknown channel");
        }
        Ok(())
    }

    async fn apply_contact(
        &self,
        event: &WebhookEvent,
        data: &ContactData,
        now: DateTime<Utc>,
    ) -> Result<(), OutpostError> {
        let name = data.push_name.as_deref().filter(|n| !n.trim().is_empty());
        let avatar = data.profile_pic_url.as_deref().filter(|u| !u.trim().is_empty());
        if name.is_none() && avatar.is_none() {
            return Ok(());
        }
        let Some(address) = data
            .remote_jid
            .as_deref()
            .filter(|jid| !is_broadcast(jid))
            .and_then(|jid| normalize_recipient(jid).ok())
        else {
            return Ok(());
        };

        conversations::update_contact(&self.db, &event.channel_id, &address, name, avatar, now)
            .await?;
        Ok(())
    }
}

/// Provider timestamps have whole-second resolution. Within the second the
/// event was received, the receive time is the better bound.
fn occurred_at(provider: Option<DateTime<Utc>>, received_at: DateTime<Utc>) -> DateTime<Utc> {
    match provider {
        Some(at) if at.timestamp() == received_at.timestamp() => at.max(received_at),
        Some(at) => at,
        None => received_at,
    }
}
