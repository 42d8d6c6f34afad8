// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation queries.
//!
//! Conversations are created and advanced by the ingestor (see
//! [`crate::queries::messages::record_incoming_message`]); this module covers
//! lookups, contact enrichment, and the follow-up candidate scan.

use chrono::{DateTime, Utc};
use outpost_core::OutpostError;
use outpost_core::time::format_timestamp;
use rusqlite::{OptionalExtension, params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::models::{CONVERSATION_COLUMNS, Conversation, conversation_from_row, placeholders};

/// Insert a conversation row as-is.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), OutpostError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, tenant_id, channel_id, remote_address, display_name,
                     avatar_url, status, assigned_to, unread_count, last_activity_at,
                     last_direction, last_preview, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    c.id,
                    c.tenant_id,
                    c.channel_id,
                    c.remote_address,
                    c.display_name,
                    c.avatar_url,
                    c.status,
                    c.assigned_to,
                    c.unread_count,
                    c.last_activity_at,
                    c.last_direction.map(|d| d.to_string()),
                    c.last_preview,
                    c.created_at,
                    c.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a conversation by ID.
pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Find the conversation for a remote address on a channel.
pub async fn find_conversation(
    db: &Database,
    channel_id: &str,
    remote_address: &str,
) -> Result<Option<Conversation>, OutpostError> {
    let channel_id = channel_id.to_string();
    let remote_address = remote_address.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE channel_id = ?1 AND remote_address = ?2"
                ),
                params![channel_id, remote_address],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply contact details to an existing conversation.
///
/// `None` leaves the stored value untouched. Returns `false` when no
/// conversation matches; contacts never create conversations.
pub async fn update_contact(
    db: &Database,
    channel_id: &str,
    remote_address: &str,
    display_name: Option<&str>,
    avatar_url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let channel_id = channel_id.to_string();
    let remote_address = remote_address.to_string();
    let display_name = display_name.map(str::to_string);
    let avatar_url = avatar_url.map(str::to_string);
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET display_name = COALESCE(?3, display_name),
                     avatar_url = COALESCE(?4, avatar_url),
                     updated_at = ?5
                 WHERE channel_id = ?1 AND remote_address = ?2",
                params![channel_id, remote_address, display_name, avatar_url, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Conversations of a tenant idle since before `cutoff`.
///
/// An empty `statuses` slice matches every conversation status. Conversations
/// that never had activity are not candidates.
pub async fn stale_conversations(
    db: &Database,
    tenant_id: &str,
    statuses: &[String],
    cutoff: DateTime<Utc>,
) -> Result<Vec<Conversation>, OutpostError> {
    let mut args = vec![tenant_id.to_string(), format_timestamp(cutoff)];
    let status_filter = if statuses.is_empty() {
        String::new()
    } else {
        args.extend(statuses.iter().cloned());
        format!(" AND status IN ({})", placeholders(3, statuses.len()))
    };
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE tenant_id = ?1
           AND last_activity_at IS NOT NULL
           AND last_activity_at < ?2{status_filter}
         ORDER BY last_activity_at ASC"
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), conversation_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
