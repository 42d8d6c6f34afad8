// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message queries: ingest-side recording, delivery status, and the
//! per-conversation "latest" lookups used by follow-ups.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use outpost_core::time::format_timestamp;
use outpost_core::{Direction, MessageKind, MessageStatus, OutpostError};
use rusqlite::{OptionalExtension, Transaction, params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::models::{MESSAGE_COLUMNS, Message, get_enum, message_from_row, placeholders};

/// A message observed through a webhook, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub tenant_id: String,
    pub channel_id: String,
    pub remote_address: String,
    pub direction: Direction,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    /// Contact name supplied by the provider.
    pub display_name: Option<String>,
    /// Conversation list preview text.
    pub preview: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Result of [`record_incoming_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A message with this provider ID already exists; nothing was written.
    Duplicate,
    Inserted {
        conversation_id: String,
        message_id: String,
        created_conversation: bool,
    },
}

/// Store an inbound (or provider-echoed outbound) message and advance its conversation.
///
/// Runs in one transaction. Redelivery of a known provider message ID is a
/// no-op, including for the conversation counters.
pub async fn record_incoming_message(
    db: &Database,
    incoming: IncomingMessage,
) -> Result<RecordOutcome, OutpostError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let outcome = record_in_tx(&tx, &incoming)?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

fn record_in_tx(tx: &Transaction<'_>, m: &IncomingMessage) -> rusqlite::Result<RecordOutcome> {
    if let Some(provider_id) = &m.provider_message_id {
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM messages WHERE channel_id = ?1 AND provider_message_id = ?2",
                params![m.channel_id, provider_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(RecordOutcome::Duplicate);
        }
    }

    let occurred_at = format_timestamp(m.occurred_at);
    let inbound = m.direction == Direction::Inbound;
    let direction = m.direction.to_string();
    // Only the contact's own messages carry their name.
    let display_name = if inbound { m.display_name.clone() } else { None };

    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM conversations WHERE channel_id = ?1 AND remote_address = ?2",
            params![m.channel_id, m.remote_address],
            |row| row.get(0),
        )
        .optional()?;

    let (conversation_id, created_conversation) = match existing {
        Some(id) => {
            tx.execute(
                "UPDATE conversations
                 SET unread_count = unread_count + ?2,
                     last_direction = CASE WHEN last_activity_at IS NULL OR ?3 >= last_activity_at
                                           THEN ?4 ELSE last_direction END,
                     last_preview = CASE WHEN last_activity_at IS NULL OR ?3 >= last_activity_at
                                         THEN ?5 ELSE last_preview END,
                     last_activity_at = CASE WHEN last_activity_at IS NULL OR ?3 > last_activity_at
                                             THEN ?3 ELSE last_activity_at END,
                     display_name = COALESCE(?6, display_name),
                     updated_at = ?3
                 WHERE id = ?1",
                params![
                    id,
                    i64::from(inbound),
                    occurred_at,
                    direction,
                    m.preview,
                    display_name
                ],
            )?;
            (id, false)
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO conversations (id, tenant_id, channel_id, remote_address, display_name,
                     unread_count, last_activity_at, last_direction, last_preview,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?7, ?7)",
                params![
                    id,
                    m.tenant_id,
                    m.channel_id,
                    m.remote_address,
                    display_name,
                    i64::from(inbound),
                    occurred_at,
                    direction,
                    m.preview,
                ],
            )?;
            (id, true)
        }
    };

    let message_id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO messages (id, tenant_id, conversation_id, channel_id, direction, kind,
             content, media_url, status, provider_message_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            message_id,
            m.tenant_id,
            conversation_id,
            m.channel_id,
            direction,
            m.kind.to_string(),
            m.content,
            m.media_url,
            m.status.to_string(),
            m.provider_message_id,
            occurred_at,
        ],
    )?;

    Ok(RecordOutcome::Inserted {
        conversation_id,
        message_id,
        created_conversation,
    })
}

/// Apply a delivery status callback to the message with this provider ID.
///
/// Status only moves forward (`pending < sent < delivered < read`); a `failed`
/// message accepts any delivery status. Returns `false` when nothing changed,
/// either because no message matches or because the update would regress.
pub async fn update_status_by_provider_id(
    db: &Database,
    channel_id: &str,
    provider_message_id: &str,
    status: MessageStatus,
    now: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let channel_id = channel_id.to_string();
    let provider_message_id = provider_message_id.to_string();
    let rank = i64::from(status.rank());
    let status = status.to_string();
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = ?3, updated_at = ?5
                 WHERE channel_id = ?1 AND provider_message_id = ?2
                   AND ?4 > 0
                   AND (status = 'failed'
                        OR (CASE status WHEN 'pending' THEN 1 WHEN 'sent' THEN 2
                                        WHEN 'delivered' THEN 3 WHEN 'read' THEN 4
                                        ELSE 0 END) < ?4)",
                params![channel_id, provider_message_id, status, rank, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a message by ID.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All messages of a conversation, oldest first.
pub async fn list_messages(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<Message>, OutpostError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map(params![conversation_id], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Direction of the newest message in each conversation.
///
/// Conversations without messages are absent from the map.
pub async fn latest_directions(
    db: &Database,
    conversation_ids: &[String],
) -> Result<HashMap<String, Direction>, OutpostError> {
    if conversation_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let args = conversation_ids.to_vec();
    // SQLite returns bare columns from the row holding MAX().
    let sql = format!(
        "SELECT conversation_id, direction, MAX(created_at) FROM messages
         WHERE conversation_id IN ({}) GROUP BY conversation_id",
        placeholders(1, args.len())
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, String>(0)?, get_enum::<Direction>(row, 1)?))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Timestamp of the newest message in `direction` for each conversation.
pub async fn latest_activity(
    db: &Database,
    conversation_ids: &[String],
    direction: Direction,
) -> Result<HashMap<String, String>, OutpostError> {
    if conversation_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut args = vec![direction.to_string()];
    args.extend(conversation_ids.iter().cloned());
    let sql = format!(
        "SELECT conversation_id, MAX(created_at) FROM messages
         WHERE direction = ?1 AND conversation_id IN ({})
         GROUP BY conversation_id",
        placeholders(2, conversation_ids.len())
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::channels::create_channel;
    use crate::queries::conversations::get_conversation;
    use chrono::{Duration, TimeZone};
    use outpost_core::{Channel, ChannelStatus};

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        create_channel(
            &db,
            &Channel {
                id: "ch-1".into(),
                tenant_id: "t-1".into(),
                name: "Sales".into(),
                instance_name: Some("sales".into()),
                base_url: None,
                api_key: None,
                status: ChannelStatus::Connected,
                owner_id: None,
                last_seen_at: None,
                created_at: "2026-01-01T00:00:00.000Z".into(),
                updated_at: "2026-01-01T00:00:00.000Z".into(),
            },
        )
        .await
        .unwrap();
        db
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn incoming(provider_id: &str, direction: Direction, minutes: i64) -> IncomingMessage {
        IncomingMessage {
            tenant_id: "t-1".into(),
            channel_id: "ch-1".into(),
            remote_address: "5511999990000".into(),
            direction,
            kind: MessageKind::Text,
            content: Some(format!("msg {provider_id}")),
            media_url: None,
            status: MessageStatus::Delivered,
            provider_message_id: Some(provider_id.into()),
            display_name: Some("Maria Souza".into()),
            preview: Some(format!("msg {provider_id}")),
            occurred_at: base() + Duration::minutes(minutes),
        }
    }

    fn inserted_conversation(outcome: &RecordOutcome) -> String {
        match outcome {
            RecordOutcome::Inserted {
                conversation_id, ..
            } => conversation_id.clone(),
            RecordOutcome::Duplicate => panic!("expected insert"),
        }
    }

    #[tokio::test]
    async fn first_inbound_creates_conversation_with_unread() {
        let db = setup().await;
        let outcome = record_incoming_message(&db, incoming("P1", Direction::Inbound, 0))
            .await
            .unwrap();
        let RecordOutcome::Inserted {
            conversation_id,
            created_conversation,
            ..
        } = outcome
        else {
            panic!("expected insert");
        };
        assert!(created_conversation);

        let conv = get_conversation(&db, &conversation_id).await.unwrap().unwrap();
        assert_eq!(conv.unread_count, 1);
        assert_eq!(conv.display_name.as_deref(), Some("Maria Souza"));
        assert_eq!(conv.last_direction, Some(Direction::Inbound));
        assert_eq!(conv.last_activity_at.as_deref(), Some("2026-03-01T12:00:00.000Z"));
    }

    #[tokio::test]
    async fn first_outbound_seeds_zero_unread_and_no_name() {
        let db = setup().await;
        let outcome = record_incoming_message(&db, incoming("P1", Direction::Outbound, 0))
            .await
            .unwrap();
        let conv = get_conversation(&db, &inserted_conversation(&outcome))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.unread_count, 0);
        assert!(conv.display_name.is_none());
    }

    #[tokio::test]
    async fn redelivery_is_a_noop() {
        let db = setup().await;
        let first = record_incoming_message(&db, incoming("P1", Direction::Inbound, 0))
            .await
            .unwrap();
        let conversation_id = inserted_conversation(&first);

        let again = record_incoming_message(&db, incoming("P1", Direction::Inbound, 0))
            .await
            .unwrap();
        assert_eq!(again, RecordOutcome::Duplicate);

        let conv = get_conversation(&db, &conversation_id).await.unwrap().unwrap();
        assert_eq!(conv.unread_count, 1);
        assert_eq!(list_messages(&db, &conversation_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn only_inbound_increments_unread_and_activity_never_regresses() {
        let db = setup().await;
        let first = record_incoming_message(&db, incoming("P1", Direction::Inbound, 10))
            .await
            .unwrap();
        let conversation_id = inserted_conversation(&first);
        record_incoming_message(&db, incoming("P2", Direction::Outbound, 20))
            .await
            .unwrap();
        // Late delivery of an older inbound message.
        record_incoming_message(&db, incoming("P3", Direction::Inbound, 5))
            .await
            .unwrap();

        let conv = get_conversation(&db, &conversation_id).await.unwrap().unwrap();
        assert_eq!(conv.unread_count, 2);
        assert_eq!(conv.last_activity_at.as_deref(), Some("2026-03-01T12:20:00.000Z"));
        assert_eq!(conv.last_direction, Some(Direction::Outbound));
        assert_eq!(conv.last_preview.as_deref(), Some("msg P2"));
    }

    #[tokio::test]
    async fn status_only_moves_forward() {
        let db = setup().await;
        let mut m = incoming("P1", Direction::Outbound, 0);
        m.status = MessageStatus::Sent;
        let outcome = record_incoming_message(&db, m).await.unwrap();
        let RecordOutcome::Inserted { message_id, .. } = outcome else {
            panic!("expected insert");
        };

        assert!(
            update_status_by_provider_id(&db, "ch-1", "P1", MessageStatus::Read, base())
                .await
                .unwrap()
        );
        assert!(
            !update_status_by_provider_id(&db, "ch-1", "P1", MessageStatus::Delivered, base())
                .await
                .unwrap()
        );
        assert!(
            !update_status_by_provider_id(&db, "ch-1", "unknown", MessageStatus::Read, base())
                .await
                .unwrap()
        );

        let msg = get_message(&db, &message_id).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn latest_lookups_split_by_direction() {
        let db = setup().await;
        let first = record_incoming_message(&db, incoming("P1", Direction::Inbound, 0))
            .await
            .unwrap();
        let conversation_id = inserted_conversation(&first);
        record_incoming_message(&db, incoming("P2", Direction::Outbound, 5))
            .await
            .unwrap();
        record_incoming_message(&db, incoming("P3", Direction::Inbound, 3))
            .await
            .unwrap();

        let ids = vec![conversation_id.clone(), "other".to_string()];
        let directions = latest_directions(&db, &ids).await.unwrap();
        assert_eq!(directions.get(&conversation_id), Some(&Direction::Outbound));
        assert!(!directions.contains_key("other"));

        let inbound = latest_activity(&db, &ids, Direction::Inbound).await.unwrap();
        assert_eq!(
            inbound.get(&conversation_id).map(String::as_str),
            Some("2026-03-01T12:03:00.000Z")
        );
        let outbound = latest_activity(&db, &ids, Direction::Outbound).await.unwrap();
        assert_eq!(
            outbound.get(&conversation_id).map(String::as_str),
            Some("2026-03-01T12:05:00.000Z")
        );
    }
}
