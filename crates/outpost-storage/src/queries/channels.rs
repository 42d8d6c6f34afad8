// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel queries.

use chrono::{DateTime, Utc};
use outpost_core::time::format_timestamp;
use outpost_core::{ChannelStatus, OutpostError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{CHANNEL_COLUMNS, Channel, channel_from_row};

/// Insert a new channel.
pub async fn create_channel(db: &Database, channel: &Channel) -> Result<(), OutpostError> {
    let c = channel.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO channels (id, tenant_id, name, instance_name, base_url, api_key,
                                       status, owner_id, last_seen_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    c.id,
                    c.tenant_id,
                    c.name,
                    c.instance_name,
                    c.base_url,
                    c.api_key,
                    c.status.to_string(),
                    c.owner_id,
                    c.last_seen_at,
                    c.created_at,
                    c.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a channel by ID.
pub async fn get_channel(db: &Database, id: &str) -> Result<Option<Channel>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                params![id],
                channel_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List channels in the given state, across all tenants.
pub async fn list_channels_by_status(
    db: &Database,
    status: ChannelStatus,
) -> Result<Vec<Channel>, OutpostError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE status = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![status], channel_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Record a connection state change.
///
/// `last_seen_at` only moves when the channel becomes connected. Returns
/// `false` when no channel has this ID.
pub async fn update_channel_status(
    db: &Database,
    id: &str,
    status: ChannelStatus,
    now: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let id = id.to_string();
    let now = format_timestamp(now);
    let connected = status == ChannelStatus::Connected;
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE channels
                 SET status = ?2,
                     last_seen_at = CASE WHEN ?3 THEN ?4 ELSE last_seen_at END,
                     updated_at = ?4
                 WHERE id = ?1",
                params![id, status, connected, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn channel(id: &str, status: ChannelStatus) -> Channel {
        Channel {
            id: id.to_string(),
            tenant_id: "t-1".to_string(),
            name: format!("Channel {id}"),
            instance_name: Some(format!("inst-{id}")),
            base_url: None,
            api_key: None,
            status,
            owner_id: None,
            last_seen_at: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_get_channel() {
        let (db, _dir) = setup_db().await;
        create_channel(&db, &channel("ch-1", ChannelStatus::Connected))
            .await
            .unwrap();

        let found = get_channel(&db, "ch-1").await.unwrap().unwrap();
        assert_eq!(found.status, ChannelStatus::Connected);
        assert_eq!(found.instance_name.as_deref(), Some("inst-ch-1"));
        assert!(get_channel(&db, "missing").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let (db, _dir) = setup_db().await;
        create_channel(&db, &channel("a", ChannelStatus::Connected))
            .await
            .unwrap();
        create_channel(&db, &channel("b", ChannelStatus::Disconnected))
            .await
            .unwrap();
        create_channel(&db, &channel("c", ChannelStatus::Connected))
            .await
            .unwrap();

        let ids: Vec<String> = list_channels_by_status(&db, ChannelStatus::Connected)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn last_seen_only_moves_on_connect() {
        let (db, _dir) = setup_db().await;
        create_channel(&db, &channel("ch-1", ChannelStatus::Connecting))
            .await
            .unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();

        assert!(
            update_channel_status(&db, "ch-1", ChannelStatus::Connected, t1)
                .await
                .unwrap()
        );
        update_channel_status(&db, "ch-1", ChannelStatus::Disconnected, t2)
            .await
            .unwrap();

        let found = get_channel(&db, "ch-1").await.unwrap().unwrap();
        assert_eq!(found.status, ChannelStatus::Disconnected);
        assert_eq!(found.last_seen_at.as_deref(), Some("2026-02-01T09:00:00.000Z"));
        assert_eq!(found.updated_at, "2026-02-01T10:00:00.000Z");

        assert!(
            !update_channel_status(&db, "nope", ChannelStatus::Connected, t2)
                .await
                .unwrap()
        );

        db.close().await.unwrap();
    }
}
