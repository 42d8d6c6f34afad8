// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observability event bus.
//!
//! Cycles publish typed [`BusEvent`]s with [`EventBus::publish`], which never
//! waits: when the bounded channel is full or the worker has gone away the
//! event is dropped and counted. A separate logging worker drains the channel
//! and writes each event as one JSON log line, so a slow sink cannot stall a
//! dispatch or ingest cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The gateway accepted an outbox item.
    OutboxSent {
        item_id: String,
        channel_id: String,
        provider_message_id: Option<String>,
    },
    /// A send attempt failed. `terminal` is set when the item will not be retried.
    OutboxFailed {
        item_id: String,
        channel_id: String,
        error: String,
        retry_count: u32,
        terminal: bool,
    },
    /// A channel was passed over for this cycle (lease held elsewhere).
    ChannelSkipped { channel_id: String, reason: String },
    /// A channel's gateway endpoint cannot be resolved.
    ChannelMisconfigured {
        channel_id: String,
        error: String,
        failed_items: usize,
    },
    /// A webhook event handler failed.
    WebhookFailed {
        event_id: i64,
        channel_id: String,
        event_kind: String,
        error: String,
    },
    FollowupCreated {
        task_id: String,
        rule_id: String,
        conversation_id: String,
        attempt: u32,
    },
    FollowupAutoSent {
        task_id: String,
        conversation_id: String,
        outbox_item_id: String,
    },
    FollowupResolved {
        task_id: String,
        conversation_id: String,
    },
}

/// An event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub timestamp: String,
    pub tenant_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl BusEvent {
    pub fn new(tenant_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: outpost_core::time::now_timestamp(),
            tenant_id: tenant_id.into(),
            kind,
        }
    }
}

/// Publishing half of the bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<BusEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus holding at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BusEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queue an event without waiting.
    pub fn publish(&self, tenant_id: &str, kind: EventKind) {
        match self.tx.try_send(BusEvent::new(tenant_id, kind)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event))
            | Err(mpsc::error::TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(event_id = %event.id, "event bus unavailable, event dropped");
            }
        }
    }

    /// Events dropped since the bus was created.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drain `rx` into the log until every [`EventBus`] clone is dropped.
pub fn spawn_log_worker(mut rx: mpsc::Receiver<BusEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!(target: "outpost::events", event = %json, "event"),
                Err(e) => debug!(error = %e, "failed to serialize event"),
            }
        }
        debug!("event log worker stopped");
    })
}
