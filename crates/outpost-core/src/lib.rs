// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Outpost message pipeline.
//!
//! Provides the domain types for channels, conversations, messages, outbox
//! items, webhook events, and follow-ups, the shared error types, and the
//! [`GatewayClient`] trait implemented by messaging gateway adapters.

pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{GatewayError, OutpostError};
pub use traits::GatewayClient;
pub use types::{
    Channel, ChannelStatus, Conversation, Direction, FollowupRule, FollowupScenario,
    FollowupStatus, FollowupTask, Member, Message, MessageKind, MessageStatus,
    NewOutboundMessage, OutboundPayload, OutboxItem, OutboxStatus, SendReceipt, WebhookEvent,
};
