// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue of raw webhook callbacks.

use chrono::{DateTime, Utc};
use outpost_core::OutpostError;
use outpost_core::time::format_timestamp;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{WEBHOOK_EVENT_COLUMNS, WebhookEvent, webhook_event_from_row};

/// Append a raw event. Returns the new event ID.
pub async fn append_event(
    db: &Database,
    tenant_id: &str,
    channel_id: &str,
    event_kind: &str,
    payload: &str,
    now: DateTime<Utc>,
) -> Result<i64, OutpostError> {
    let tenant_id = tenant_id.to_string();
    let channel_id = channel_id.to_string();
    let event_kind = event_kind.to_string();
    let payload = payload.to_string();
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO webhook_events (tenant_id, channel_id, event_kind, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![tenant_id, channel_id, event_kind, payload, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Oldest unprocessed events whose retry count is below `max_retries`.
pub async fn fetch_pending(
    db: &Database,
    limit: usize,
    max_retries: u32,
) -> Result<Vec<WebhookEvent>, OutpostError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WEBHOOK_EVENT_COLUMNS} FROM webhook_events
                 WHERE processed = 0 AND retry_count < ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![max_retries, limit], webhook_event_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an event handled.
pub async fn mark_processed(db: &Database, id: i64, now: DateTime<Utc>) -> Result<(), OutpostError> {
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhook_events SET processed = 1, processed_at = ?2, last_error = NULL
                 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Count a failed handling attempt; the event stays unprocessed.
pub async fn record_failure(db: &Database, id: i64, error: &str) -> Result<(), OutpostError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhook_events SET retry_count = retry_count + 1, last_error = ?2
                 WHERE id = ?1",
                params![id, error],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get an event by ID.
pub async fn get_event(db: &Database, id: i64) -> Result<Option<WebhookEvent>, OutpostError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {WEBHOOK_EVENT_COLUMNS} FROM webhook_events WHERE id = ?1"),
                params![id],
                webhook_event_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[tokio::test]
    async fn pending_events_come_oldest_first() {
        let db = Database::open_in_memory().await.unwrap();
        let late = append_event(&db, "t", "ch", "messages.upsert", "{}", at(5))
            .await
            .unwrap();
        let early = append_event(&db, "t", "ch", "messages.update", "{}", at(1))
            .await
            .unwrap();
        let same_time = append_event(&db, "t", "ch", "connection.update", "{}", at(5))
            .await
            .unwrap();

        let ids: Vec<i64> = fetch_pending(&db, 10, 5)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![early, late, same_time]);
    }

    #[tokio::test]
    async fn processed_and_exhausted_events_are_skipped() {
        let db = Database::open_in_memory().await.unwrap();
        let done = append_event(&db, "t", "ch", "a", "{}", at(0)).await.unwrap();
        let flaky = append_event(&db, "t", "ch", "b", "{}", at(1)).await.unwrap();

        mark_processed(&db, done, at(2)).await.unwrap();
        record_failure(&db, flaky, "bad payload").await.unwrap();
        record_failure(&db, flaky, "bad payload").await.unwrap();

        assert!(fetch_pending(&db, 10, 2).await.unwrap().is_empty());
        assert_eq!(fetch_pending(&db, 10, 3).await.unwrap().len(), 1);

        let flaky = get_event(&db, flaky).await.unwrap().unwrap();
        assert!(!flaky.processed);
        assert_eq!(flaky.retry_count, 2);
        assert_eq!(flaky.last_error.as_deref(), Some("bad payload"));

        let done = get_event(&db, done).await.unwrap().unwrap();
        assert!(done.processed);
        assert_eq!(done.processed_at.as_deref(), Some("2026-03-01T12:00:02.000Z"));
    }
}
