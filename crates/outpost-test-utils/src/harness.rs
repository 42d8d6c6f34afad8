// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` owns a temp SQLite database with migrations applied, a
//! [`MockGateway`], and an event bus whose receiver the test can drain.
//! Seed helpers insert channels, members, conversations, and messages with
//! sensible defaults so tests only spell out what they assert on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use outpost_bus::{BusEvent, EventBus};
use outpost_config::OutpostConfig;
use outpost_core::time::format_timestamp;
use outpost_core::{
    Channel, ChannelStatus, Conversation, Direction, Member, Message, MessageKind, MessageStatus,
    NewOutboundMessage, OutboxItem, OutpostError,
};
use outpost_storage::Database;
use outpost_storage::queries::{channels, conversations, members, messages, outbox};
use outpost_storage::{IncomingMessage, RecordOutcome};

use crate::mock_gateway::MockGateway;

/// Tenant every seeded row belongs to unless a test says otherwise.
pub const TENANT: &str = "tenant-1";

/// A temp database plus mock collaborators.
pub struct TestHarness {
    pub db: Database,
    pub config: OutpostConfig,
    pub gateway: Arc<MockGateway>,
    pub bus: EventBus,
    events: mpsc::Receiver<BusEvent>,
    /// Kept alive so the database file outlives the test body.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Harness with a default config and an always-succeeding gateway.
    pub async fn new() -> Result<Self, OutpostError> {
        Self::with_gateway(MockGateway::new()).await
    }

    pub async fn with_gateway(gateway: MockGateway) -> Result<Self, OutpostError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| OutpostError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("outpost-test.db");

        let mut config = OutpostConfig::default();
        config.storage.database_path = db_path.to_string_lossy().to_string();

        let db = Database::from_config(&config.storage).await?;
        let (bus, events) = EventBus::new(config.events.capacity);

        Ok(Self {
            db,
            config,
            gateway: Arc::new(gateway),
            bus,
            events,
            _temp_dir: temp_dir,
        })
    }

    /// Insert a connected channel with an instance name.
    pub async fn seed_channel(&self, id: &str) -> Result<Channel, OutpostError> {
        self.seed_channel_with(id, ChannelStatus::Connected, None).await
    }

    pub async fn seed_channel_with(
        &self,
        id: &str,
        status: ChannelStatus,
        owner_id: Option<&str>,
    ) -> Result<Channel, OutpostError> {
        let now = format_timestamp(Utc::now());
        let channel = Channel {
            id: id.to_string(),
            tenant_id: TENANT.to_string(),
            name: format!("Channel {id}"),
            instance_name: Some(format!("instance-{id}")),
            base_url: None,
            api_key: None,
            status,
            owner_id: owner_id.map(str::to_string),
            last_seen_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        channels::create_channel(&self.db, &channel).await?;
        Ok(channel)
    }

    pub async fn seed_member(&self, id: &str, name: &str) -> Result<Member, OutpostError> {
        let member = Member {
            id: id.to_string(),
            tenant_id: TENANT.to_string(),
            name: name.to_string(),
        };
        members::create_member(&self.db, &member).await?;
        Ok(member)
    }

    /// Insert an `open` conversation with no activity yet.
    pub async fn seed_conversation(
        &self,
        channel_id: &str,
        remote_address: &str,
        display_name: Option<&str>,
    ) -> Result<Conversation, OutpostError> {
        let now = format_timestamp(Utc::now());
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: TENANT.to_string(),
            channel_id: channel_id.to_string(),
            remote_address: remote_address.to_string(),
            display_name: display_name.map(str::to_string),
            avatar_url: None,
            status: "open".to_string(),
            assigned_to: None,
            unread_count: 0,
            last_activity_at: None,
            last_direction: None,
            last_preview: None,
            created_at: now.clone(),
            updated_at: now,
        };
        conversations::create_conversation(&self.db, &conversation).await?;
        Ok(conversation)
    }

    /// Record a text message in a conversation at a given instant.
    ///
    /// Goes through the same path as webhook ingestion, so the conversation's
    /// activity fields move exactly as they would in production.
    pub async fn seed_message(
        &self,
        conversation: &Conversation,
        direction: Direction,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<String, OutpostError> {
        let status = match direction {
            Direction::Inbound => MessageStatus::Delivered,
            Direction::Outbound => MessageStatus::Sent,
        };
        let outcome = messages::record_incoming_message(
            &self.db,
            IncomingMessage {
                tenant_id: conversation.tenant_id.clone(),
                channel_id: conversation.channel_id.clone(),
                remote_address: conversation.remote_address.clone(),
                direction,
                kind: MessageKind::Text,
                content: Some(text.to_string()),
                media_url: None,
                status,
                provider_message_id: Some(uuid::Uuid::new_v4().to_string()),
                display_name: None,
                preview: Some(text.to_string()),
                occurred_at: at,
            },
        )
        .await?;
        match outcome {
            RecordOutcome::Inserted { message_id, .. } => Ok(message_id),
            RecordOutcome::Duplicate => Err(OutpostError::Internal(
                "seeded message collided with an existing provider id".into(),
            )),
        }
    }

    /// Queue an outbound text message for a conversation.
    pub async fn enqueue_text(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<(Message, OutboxItem), OutpostError> {
        outbox::enqueue_message(
            &self.db,
            &NewOutboundMessage {
                conversation_id: conversation_id.to_string(),
                kind: MessageKind::Text,
                content: Some(text.to_string()),
                media_url: None,
                file_name: None,
                max_retries: self.config.dispatch.max_retries,
            },
            Utc::now(),
        )
        .await
    }

    /// Take every bus event published so far.
    pub fn drain_events(&mut self) -> Vec<BusEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
