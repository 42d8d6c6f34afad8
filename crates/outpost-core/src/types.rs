// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by storage, dispatch, ingest, and follow-up crates.
//!
//! Status enums render to and parse from their snake_case names, which is
//! also how they are persisted. Timestamps are carried as ISO-8601 strings
//! produced by [`crate::time::format_timestamp`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Connection state of a messaging channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

/// Which side of the conversation produced a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sent by the remote contact.
    Inbound,
    /// Sent by the team (or by the pipeline on its behalf).
    Outbound,
}

/// Normalized message content type.
///
/// Only text, image, video, audio, and document can be sent through the
/// gateway; the remaining kinds are recorded from inbound traffic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
    Reaction,
}

impl MessageKind {
    /// Whether the gateway accepts this kind for outbound delivery.
    pub fn is_sendable(self) -> bool {
        matches!(
            self,
            MessageKind::Text
                | MessageKind::Image
                | MessageKind::Video
                | MessageKind::Audio
                | MessageKind::Document
        )
    }
}

/// Delivery status mirrored on a message row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Progress rank used to reject out-of-order delivery callbacks.
    ///
    /// `Failed` ranks lowest so a late delivery receipt still wins.
    pub fn rank(self) -> u8 {
        match self {
            MessageStatus::Failed => 0,
            MessageStatus::Pending => 1,
            MessageStatus::Sent => 2,
            MessageStatus::Delivered => 3,
            MessageStatus::Read => 4,
        }
    }
}

/// Lifecycle of an outbox item.
///
/// Transitions: `pending -> sending -> {sent, pending, failed}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

/// Directional condition under which a conversation needs follow-up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FollowupScenario {
    /// Team spoke last and the customer has not answered.
    ClientSilent,
    /// Customer spoke last and the team has not answered.
    TeamSilent,
    /// No activity in either direction.
    ConversationStalled,
}

impl FollowupScenario {
    /// Direction the latest message must have for the rule to apply.
    pub fn required_last_direction(self) -> Option<Direction> {
        match self {
            FollowupScenario::ClientSilent => Some(Direction::Outbound),
            FollowupScenario::TeamSilent => Some(Direction::Inbound),
            FollowupScenario::ConversationStalled => None,
        }
    }
}

/// Lifecycle of a follow-up task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FollowupStatus {
    Pending,
    Sent,
    Responded,
    Cancelled,
}

impl FollowupStatus {
    /// Active tasks block creation of another task for the same rule and conversation.
    pub fn is_active(self) -> bool {
        matches!(self, FollowupStatus::Pending | FollowupStatus::Sent)
    }
}

/// A configured connection to the messaging gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Gateway-side instance identifier used in request paths.
    pub instance_name: Option<String>,
    /// Per-channel gateway URL; falls back to the global default.
    pub base_url: Option<String>,
    /// Per-channel API key; falls back to the global default.
    pub api_key: Option<String>,
    pub status: ChannelStatus,
    /// Member who owns conversations on this channel by default.
    pub owner_id: Option<String>,
    pub last_seen_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A team member that can be assigned conversations and follow-ups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
}

/// One conversation per (channel, remote address) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub channel_id: String,
    /// Canonical recipient address (digits, or a group JID).
    pub remote_address: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// CRM pipeline status (e.g. "open", "negotiating").
    pub status: String,
    pub assigned_to: Option<String>,
    pub unread_count: i64,
    pub last_activity_at: Option<String>,
    pub last_direction: Option<Direction>,
    pub last_preview: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A message in a conversation, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub channel_id: String,
    pub direction: Direction,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub status: MessageStatus,
    /// Gateway identifier used to correlate status callbacks.
    pub provider_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One queued physical send attempt for a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxItem {
    pub id: String,
    pub tenant_id: String,
    pub channel_id: String,
    pub conversation_id: String,
    /// Parent message whose status mirrors this item.
    pub message_id: String,
    pub recipient: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_at: String,
    pub sent_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A raw provider callback waiting to be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub tenant_id: String,
    pub channel_id: String,
    pub event_kind: String,
    /// Opaque JSON body as received.
    pub payload: String,
    pub processed: bool,
    pub processed_at: Option<String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: String,
}

/// Tenant-scoped rule describing when a conversation is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupRule {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Conversation statuses the rule applies to. Empty means any status.
    pub statuses: Vec<String>,
    pub scenario: FollowupScenario,
    pub stale_threshold_minutes: i64,
    pub max_attempts: u32,
    pub auto_send: bool,
    pub template: Option<String>,
    pub active: bool,
    pub created_at: String,
}

/// One scheduled or attempted follow-up contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupTask {
    pub id: String,
    pub tenant_id: String,
    pub rule_id: String,
    pub conversation_id: String,
    pub status: FollowupStatus,
    /// Starts at 1 and strictly increases per (rule, conversation).
    pub attempt: u32,
    pub scheduled_at: String,
    pub sent_at: Option<String>,
    pub responded_at: Option<String>,
    pub assigned_to: Option<String>,
    /// Rendered text when the task was auto-sent.
    pub message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating an outbound message and its outbox item together.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboundMessage {
    pub conversation_id: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub max_retries: u32,
}

/// Content handed to the gateway for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    pub recipient: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
}

impl From<&OutboxItem> for OutboundPayload {
    fn from(item: &OutboxItem) -> Self {
        Self {
            recipient: item.recipient.clone(),
            kind: item.kind,
            content: item.content.clone(),
            media_url: item.media_url.clone(),
            file_name: item.file_name.clone(),
        }
    }
}

/// Successful gateway acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_enums_use_snake_case() {
        assert_eq!(OutboxStatus::Sending.to_string(), "sending");
        assert_eq!(
            FollowupScenario::from_str("client_silent").unwrap(),
            FollowupScenario::ClientSilent
        );
        assert_eq!(
            FollowupScenario::ConversationStalled.to_string(),
            "conversation_stalled"
        );
        assert_eq!(ChannelStatus::from_str("connected").unwrap(), ChannelStatus::Connected);
        assert!(MessageKind::from_str("gif").is_err());
    }

    #[test]
    fn serde_matches_display() {
        let json = serde_json::to_string(&FollowupStatus::Responded).unwrap();
        assert_eq!(json, "\"responded\"");
        let parsed: MessageStatus = serde_json::from_str("\"delivered\"").unwrap();
        assert_eq!(parsed, MessageStatus::Delivered);
    }

    #[test]
    fn message_status_rank_orders_progress() {
        assert!(MessageStatus::Read.rank() > MessageStatus::Delivered.rank());
        assert!(MessageStatus::Delivered.rank() > MessageStatus::Sent.rank());
        assert!(MessageStatus::Sent.rank() > MessageStatus::Pending.rank());
        assert!(MessageStatus::Pending.rank() > MessageStatus::Failed.rank());
    }

    #[test]
    fn scenario_direction_requirements() {
        assert_eq!(
            FollowupScenario::ClientSilent.required_last_direction(),
            Some(Direction::Outbound)
        );
        assert_eq!(
            FollowupScenario::TeamSilent.required_last_direction(),
            Some(Direction::Inbound)
        );
        assert_eq!(
            FollowupScenario::ConversationStalled.required_last_direction(),
            None
        );
    }

    #[test]
    fn only_pending_and_sent_tasks_are_active() {
        assert!(FollowupStatus::Pending.is_active());
        assert!(FollowupStatus::Sent.is_active());
        assert!(!FollowupStatus::Responded.is_active());
        assert!(!FollowupStatus::Cancelled.is_active());
    }

    #[test]
    fn sendable_kinds() {
        assert!(MessageKind::Document.is_sendable());
        assert!(!MessageKind::Sticker.is_sendable());
        assert!(!MessageKind::Location.is_sendable());
    }
}
