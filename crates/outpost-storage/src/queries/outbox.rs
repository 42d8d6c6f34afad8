// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox operations.
//!
//! Items move `pending -> sending -> {sent, pending, failed}`. Every transition
//! out of `sending` is conditional on the item still being `sending`, so a row
//! reclaimed by the stale sweep cannot be finalized twice.

use chrono::{DateTime, Utc};
use outpost_core::time::format_timestamp;
use outpost_core::{
    Direction, MessageStatus, NewOutboundMessage, OutboxStatus, OutpostError,
};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{
    MESSAGE_COLUMNS, Message, OUTBOX_COLUMNS, OutboxItem, message_from_row, outbox_from_row,
};

/// Create an outbound message and its outbox item for a conversation.
///
/// Both rows are written in one transaction and the conversation's activity,
/// direction, and preview are advanced to `now`. The recipient is the
/// conversation's remote address; the gateway normalizes it at send time.
pub async fn enqueue_message(
    db: &Database,
    new: &NewOutboundMessage,
    now: DateTime<Utc>,
) -> Result<(Message, OutboxItem), OutpostError> {
    let new = new.clone();
    let conversation_id = new.conversation_id.clone();
    let now = format_timestamp(now);
    let created = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let target: Option<(String, String, String)> = tx
                .query_row(
                    "SELECT tenant_id, channel_id, remote_address FROM conversations WHERE id = ?1",
                    params![new.conversation_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let Some((tenant_id, channel_id, recipient)) = target else {
                return Ok(None);
            };

            let message = Message {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: tenant_id.clone(),
                conversation_id: new.conversation_id.clone(),
                channel_id: channel_id.clone(),
                direction: Direction::Outbound,
                kind: new.kind,
                content: new.content.clone(),
                media_url: new.media_url.clone(),
                status: MessageStatus::Pending,
                provider_message_id: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            tx.execute(
                "INSERT INTO messages (id, tenant_id, conversation_id, channel_id, direction, kind,
                     content, media_url, status, provider_message_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?10)",
                params![
                    message.id,
                    message.tenant_id,
                    message.conversation_id,
                    message.channel_id,
                    message.direction.to_string(),
                    message.kind.to_string(),
                    message.content,
                    message.media_url,
                    message.status.to_string(),
                    now,
                ],
            )?;

            let item = OutboxItem {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id,
                channel_id,
                conversation_id: new.conversation_id.clone(),
                message_id: message.id.clone(),
                recipient,
                kind: new.kind,
                content: new.content.clone(),
                media_url: new.media_url.clone(),
                file_name: new.file_name.clone(),
                status: OutboxStatus::Pending,
                retry_count: 0,
                max_retries: new.max_retries,
                scheduled_at: now.clone(),
                sent_at: None,
                last_error: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            tx.execute(
                "INSERT INTO outbox (id, tenant_id, channel_id, conversation_id, message_id,
                     recipient, kind, content, media_url, file_name, status, retry_count,
                     max_retries, scheduled_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?13, ?13, ?13)",
                params![
                    item.id,
                    item.tenant_id,
                    item.channel_id,
                    item.conversation_id,
                    item.message_id,
                    item.recipient,
                    item.kind.to_string(),
                    item.content,
                    item.media_url,
                    item.file_name,
                    item.status.to_string(),
                    item.max_retries,
                    now,
                ],
            )?;

            let preview = new
                .content
                .clone()
                .unwrap_or_else(|| format!("[{}]", new.kind));
            tx.execute(
                "UPDATE conversations
                 SET last_direction = 'outbound',
                     last_preview = ?2,
                     last_activity_at = CASE WHEN last_activity_at IS NULL OR ?3 > last_activity_at
                                             THEN ?3 ELSE last_activity_at END,
                     updated_at = ?3
                 WHERE id = ?1",
                params![new.conversation_id, preview, now],
            )?;

            tx.commit()?;
            Ok(Some((message, item)))
        })
        .await
        .map_err(map_tr_err)?;

    created.ok_or(OutpostError::NotFound {
        entity: "conversation",
        id: conversation_id,
    })
}

/// Get an outbox item by ID.
pub async fn get_item(db: &Database, id: &str) -> Result<Option<OutboxItem>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE id = ?1"),
                params![id],
                outbox_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Items of a conversation, oldest first.
pub async fn items_for_conversation(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<OutboxItem>, OutpostError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OUTBOX_COLUMNS} FROM outbox
                 WHERE conversation_id = ?1 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map(params![conversation_id], outbox_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Pending items of a channel that are due and still under their retry ceiling.
pub async fn fetch_ready(
    db: &Database,
    channel_id: &str,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<OutboxItem>, OutpostError> {
    let channel_id = channel_id.to_string();
    let now = format_timestamp(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OUTBOX_COLUMNS} FROM outbox
                 WHERE channel_id = ?1 AND status = 'pending'
                   AND scheduled_at <= ?2 AND retry_count < max_retries
                 ORDER BY scheduled_at ASC, created_at ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![channel_id, now, limit], outbox_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Claim a pending item for sending. `false` means someone else claimed it first.
pub async fn claim_item(db: &Database, id: &str, now: DateTime<Utc>) -> Result<bool, OutpostError> {
    let id = id.to_string();
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE outbox SET status = 'sending', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Finalize a successful send and mirror it onto the parent message.
pub async fn mark_sent(
    db: &Database,
    item: &OutboxItem,
    provider_message_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let item_id = item.id.clone();
    let message_id = item.message_id.clone();
    let channel_id = item.channel_id.clone();
    let provider_message_id = provider_message_id.map(str::to_string);
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE outbox SET status = 'sent', sent_at = ?2, last_error = NULL, updated_at = ?2
                 WHERE id = ?1 AND status = 'sending'",
                params![item_id, now],
            )?;
            if changed == 1 {
                // A webhook echo may already have stored this provider ID on its own row.
                tx.execute(
                    "UPDATE messages
                     SET status = 'sent',
                         provider_message_id = CASE
                             WHEN ?2 IS NULL THEN provider_message_id
                             WHEN EXISTS (SELECT 1 FROM messages
                                          WHERE channel_id = ?3 AND provider_message_id = ?2)
                                 THEN provider_message_id
                             ELSE ?2 END,
                         updated_at = ?4
                     WHERE id = ?1 AND status IN ('pending', 'failed')",
                    params![message_id, provider_message_id, channel_id, now],
                )?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Return a failed item to the queue, counting the attempt.
pub async fn reschedule_item(
    db: &Database,
    id: &str,
    error: &str,
    retry_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let id = id.to_string();
    let error = error.to_string();
    let retry_at = format_timestamp(retry_at);
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE outbox
                 SET status = 'pending', retry_count = retry_count + 1, last_error = ?2,
                     scheduled_at = ?3, updated_at = ?4
                 WHERE id = ?1 AND status = 'sending'",
                params![id, error, retry_at, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Terminally fail an item, counting the attempt, and fail its parent message.
pub async fn mark_failed(
    db: &Database,
    item: &OutboxItem,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let item_id = item.id.clone();
    let message_id = item.message_id.clone();
    let error = error.to_string();
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE outbox
                 SET status = 'failed', retry_count = retry_count + 1, last_error = ?2,
                     updated_at = ?3
                 WHERE id = ?1 AND status = 'sending'",
                params![item_id, error, now],
            )?;
            if changed == 1 {
                tx.execute(
                    "UPDATE messages SET status = 'failed', updated_at = ?2
                     WHERE id = ?1 AND status = 'pending'",
                    params![message_id, now],
                )?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Put items stuck in `sending` since before `cutoff` back to `pending`.
///
/// The retry counter is left alone. Returns how many items were recovered.
pub async fn recover_stale_sending(
    db: &Database,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<usize, OutpostError> {
    let cutoff = format_timestamp(cutoff);
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbox SET status = 'pending', updated_at = ?2
                 WHERE status = 'sending' AND updated_at < ?1",
                params![cutoff, now],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Parent message of an outbox item.
pub async fn parent_message(
    db: &Database,
    item: &OutboxItem,
) -> Result<Option<Message>, OutpostError> {
    let message_id = item.message_id.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![message_id],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::channels::create_channel;
    use crate::queries::conversations::{create_conversation, get_conversation};
    use chrono::{Duration, TimeZone};
    use outpost_core::{Channel, ChannelStatus, Conversation, MessageKind};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

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
        create_conversation(
            &db,
            &Conversation {
                id: "c-1".into(),
                tenant_id: "t-1".into(),
                channel_id: "ch-1".into(),
                remote_address: "5511999990000@s.whatsapp.net".into(),
                display_name: Some("Maria".into()),
                avatar_url: None,
                status: "open".into(),
                assigned_to: None,
                unread_count: 0,
                last_activity_at: Some("2026-03-01T10:00:00.000Z".into()),
                last_direction: Some(Direction::Inbound),
                last_preview: None,
                created_at: "2026-01-01T00:00:00.000Z".into(),
                updated_at: "2026-01-01T00:00:00.000Z".into(),
            },
        )
        .await
        .unwrap();
        db
    }

    fn text(content: &str) -> NewOutboundMessage {
        NewOutboundMessage {
            conversation_id: "c-1".into(),
            kind: MessageKind::Text,
            content: Some(content.into()),
            media_url: None,
            file_name: None,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn enqueue_creates_message_item_and_touches_conversation() {
        let db = setup().await;
        let (message, item) = enqueue_message(&db, &text("hello"), base()).await.unwrap();

        assert_eq!(message.status, MessageStatus::Pending);
        assert_eq!(item.status, OutboxStatus::Pending);
        assert_eq!(item.message_id, message.id);
        assert_eq!(item.recipient, "5511999990000@s.whatsapp.net");
        assert_eq!(item.scheduled_at, "2026-03-01T12:00:00.000Z");

        let conv = get_conversation(&db, "c-1").await.unwrap().unwrap();
        assert_eq!(conv.last_direction, Some(Direction::Outbound));
        assert_eq!(conv.last_preview.as_deref(), Some("hello"));
        assert_eq!(conv.last_activity_at.as_deref(), Some("2026-03-01T12:00:00.000Z"));
    }

    #[tokio::test]
    async fn enqueue_for_missing_conversation_is_not_found() {
        let db = setup().await;
        let mut new = text("hello");
        new.conversation_id = "nope".into();
        let err = enqueue_message(&db, &new, base()).await.unwrap_err();
        assert!(matches!(err, OutpostError::NotFound { entity: "conversation", .. }));
    }

    #[tokio::test]
    async fn fetch_ready_honours_schedule_ceiling_and_order() {
        let db = setup().await;
        let (_, first) = enqueue_message(&db, &text("a"), base()).await.unwrap();
        let (_, second) = enqueue_message(&db, &text("b"), base() + Duration::seconds(1))
            .await
            .unwrap();
        let (_, future) = enqueue_message(&db, &text("c"), base() + Duration::hours(1))
            .await
            .unwrap();

        let ready = fetch_ready(&db, "ch-1", base() + Duration::minutes(1), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = ready.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert!(!ids.contains(&future.id.as_str()));

        let limited = fetch_ready(&db, "ch-1", base() + Duration::minutes(1), 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn only_one_claim_wins() {
        let db = setup().await;
        let (_, item) = enqueue_message(&db, &text("a"), base()).await.unwrap();

        let a = claim_item(&db, &item.id, base());
        let b = claim_item(&db, &item.id, base());
        let (a, b) = tokio::join!(a, b);
        assert!(a.unwrap() ^ b.unwrap());
    }

    #[tokio::test]
    async fn mark_sent_propagates_provider_id() {
        let db = setup().await;
        let (message, item) = enqueue_message(&db, &text("a"), base()).await.unwrap();
        assert!(claim_item(&db, &item.id, base()).await.unwrap());

        assert!(mark_sent(&db, &item, Some("WAID-1"), base()).await.unwrap());
        // Second finalize is refused.
        assert!(!mark_sent(&db, &item, Some("WAID-1"), base()).await.unwrap());

        let stored = get_item(&db, &item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Sent);
        assert_eq!(stored.sent_at.as_deref(), Some("2026-03-01T12:00:00.000Z"));

        let parent = parent_message(&db, &item).await.unwrap().unwrap();
        assert_eq!(parent.id, message.id);
        assert_eq!(parent.status, MessageStatus::Sent);
        assert_eq!(parent.provider_message_id.as_deref(), Some("WAID-1"));
    }

    #[tokio::test]
    async fn reschedule_then_fail() {
        let db = setup().await;
        let (_, item) = enqueue_message(&db, &text("a"), base()).await.unwrap();

        assert!(claim_item(&db, &item.id, base()).await.unwrap());
        let retry_at = base() + Duration::seconds(30);
        assert!(
            reschedule_item(&db, &item.id, "gateway returned 500: boom", retry_at, base())
                .await
                .unwrap()
        );
        let stored = get_item(&db, &item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.scheduled_at, "2026-03-01T12:00:30.000Z");

        assert!(claim_item(&db, &item.id, retry_at).await.unwrap());
        assert!(mark_failed(&db, &item, "fatal", retry_at).await.unwrap());
        let stored = get_item(&db, &item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Failed);
        assert_eq!(stored.retry_count, 2);
        assert_eq!(stored.last_error.as_deref(), Some("fatal"));

        let parent = parent_message(&db, &item).await.unwrap().unwrap();
        assert_eq!(parent.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn stale_sending_is_recovered() {
        let db = setup().await;
        let (_, old) = enqueue_message(&db, &text("a"), base()).await.unwrap();
        let (_, fresh) = enqueue_message(&db, &text("b"), base()).await.unwrap();
        assert!(claim_item(&db, &old.id, base()).await.unwrap());
        assert!(
            claim_item(&db, &fresh.id, base() + Duration::minutes(9))
                .await
                .unwrap()
        );

        let now = base() + Duration::minutes(12);
        let recovered = recover_stale_sending(&db, now - Duration::minutes(10), now)
            .await
            .unwrap();
        assert_eq!(recovered, 1);
        let old = get_item(&db, &old.id).await.unwrap().unwrap();
        assert_eq!(old.status, OutboxStatus::Pending);
        assert_eq!(old.retry_count, 0);
        let fresh = get_item(&db, &fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, OutboxStatus::Sending);
    }
}
