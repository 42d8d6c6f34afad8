// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite rows and the domain types in `outpost-core`.
//!
//! Enums are stored as their snake_case names. The column lists below are the
//! single source of truth for `SELECT` order; the `*_from_row` functions read
//! them positionally.

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;

pub use outpost_core::types::{
    Channel, Conversation, FollowupRule, FollowupTask, Member, Message, OutboxItem, WebhookEvent,
};

pub(crate) const CHANNEL_COLUMNS: &str = "id, tenant_id, name, instance_name, base_url, api_key, \
     status, owner_id, last_seen_at, created_at, updated_at";

pub(crate) const CONVERSATION_COLUMNS: &str = "id, tenant_id, channel_id, remote_address, \
     display_name, avatar_url, status, assigned_to, unread_count, last_activity_at, \
     last_direction, last_preview, created_at, updated_at";

pub(crate) const MESSAGE_COLUMNS: &str = "id, tenant_id, conversation_id, channel_id, direction, \
     kind, content, media_url, status, provider_message_id, created_at, updated_at";

pub(crate) const OUTBOX_COLUMNS: &str = "id, tenant_id, channel_id, conversation_id, message_id, \
     recipient, kind, content, media_url, file_name, status, retry_count, max_retries, \
     scheduled_at, sent_at, last_error, created_at, updated_at";

pub(crate) const WEBHOOK_EVENT_COLUMNS: &str = "id, tenant_id, channel_id, event_kind, payload, \
     processed, processed_at, retry_count, last_error, created_at";

pub(crate) const RULE_COLUMNS: &str = "id, tenant_id, name, statuses, scenario, \
     stale_threshold_minutes, max_attempts, auto_send, template, active, created_at";

pub(crate) const TASK_COLUMNS: &str = "id, tenant_id, rule_id, conversation_id, status, attempt, \
     scheduled_at, sent_at, responded_at, assigned_to, message, created_at, updated_at";

/// Read a TEXT column and parse it with `FromStr` (strum-derived enums).
pub(crate) fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_opt_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        instance_name: row.get(3)?,
        base_url: row.get(4)?,
        api_key: row.get(5)?,
        status: get_enum(row, 6)?,
        owner_id: row.get(7)?,
        last_seen_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        channel_id: row.get(2)?,
        remote_address: row.get(3)?,
        display_name: row.get(4)?,
        avatar_url: row.get(5)?,
        status: row.get(6)?,
        assigned_to: row.get(7)?,
        unread_count: row.get(8)?,
        last_activity_at: row.get(9)?,
        last_direction: get_opt_enum(row, 10)?,
        last_preview: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        conversation_id: row.get(2)?,
        channel_id: row.get(3)?,
        direction: get_enum(row, 4)?,
        kind: get_enum(row, 5)?,
        content: row.get(6)?,
        media_url: row.get(7)?,
        status: get_enum(row, 8)?,
        provider_message_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub(crate) fn outbox_from_row(row: &Row<'_>) -> rusqlite::Result<OutboxItem> {
    Ok(OutboxItem {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        channel_id: row.get(2)?,
        conversation_id: row.get(3)?,
        message_id: row.get(4)?,
        recipient: row.get(5)?,
        kind: get_enum(row, 6)?,
        content: row.get(7)?,
        media_url: row.get(8)?,
        file_name: row.get(9)?,
        status: get_enum(row, 10)?,
        retry_count: row.get(11)?,
        max_retries: row.get(12)?,
        scheduled_at: row.get(13)?,
        sent_at: row.get(14)?,
        last_error: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

pub(crate) fn webhook_event_from_row(row: &Row<'_>) -> rusqlite::Result<WebhookEvent> {
    Ok(WebhookEvent {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        channel_id: row.get(2)?,
        event_kind: row.get(3)?,
        payload: row.get(4)?,
        processed: row.get(5)?,
        processed_at: row.get(6)?,
        retry_count: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub(crate) fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<FollowupRule> {
    let statuses: String = row.get(3)?;
    let statuses: Vec<String> = serde_json::from_str(&statuses)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(FollowupRule {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        statuses,
        scenario: get_enum(row, 4)?,
        stale_threshold_minutes: row.get(5)?,
        max_attempts: row.get(6)?,
        auto_send: row.get(7)?,
        template: row.get(8)?,
        active: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub(crate) fn task_from_row(row: &Row<'_>) -> rusqlite::Result<FollowupTask> {
    Ok(FollowupTask {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        rule_id: row.get(2)?,
        conversation_id: row.get(3)?,
        status: get_enum(row, 4)?,
        attempt: row.get(5)?,
        scheduled_at: row.get(6)?,
        sent_at: row.get(7)?,
        responded_at: row.get(8)?,
        assigned_to: row.get(9)?,
        message: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// `?1, ?2, ..., ?n` starting at `start`.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(3, 2), "?3, ?4");
        assert_eq!(placeholders(1, 0), "");
    }
}
