// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease rows backing the per-channel dispatch lock.
//!
//! A lease is free when no row exists for `(tenant_id, channel_id)` or the
//! existing row has expired. Acquisition is a single conditional upsert, so two
//! writers racing for the same channel cannot both succeed.

use chrono::{DateTime, Utc};
use outpost_core::OutpostError;
use outpost_core::time::format_timestamp;
use rusqlite::params;

use crate::database::{Database, map_tr_err};

/// Try to take the lease for `holder` until `expires_at`.
///
/// Returns `true` when the lease was created or taken over from an expired holder.
pub async fn try_acquire_lease(
    db: &Database,
    tenant_id: &str,
    channel_id: &str,
    holder: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let tenant_id = tenant_id.to_string();
    let channel_id = channel_id.to_string();
    let holder = holder.to_string();
    let now = format_timestamp(now);
    let expires_at = format_timestamp(expires_at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT INTO channel_locks (tenant_id, channel_id, holder, acquired_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (tenant_id, channel_id) DO UPDATE
                 SET holder = excluded.holder,
                     acquired_at = excluded.acquired_at,
                     expires_at = excluded.expires_at
                 WHERE channel_locks.expires_at <= ?4",
                params![tenant_id, channel_id, holder, now, expires_at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Drop the lease if `holder` still owns it. Returns whether a row was removed.
pub async fn release_lease(
    db: &Database,
    tenant_id: &str,
    channel_id: &str,
    holder: &str,
) -> Result<bool, OutpostError> {
    let tenant_id = tenant_id.to_string();
    let channel_id = channel_id.to_string();
    let holder = holder.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM channel_locks
                 WHERE tenant_id = ?1 AND channel_id = ?2 AND holder = ?3",
                params![tenant_id, channel_id, holder],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(min)
    }

    #[tokio::test]
    async fn second_holder_is_refused_until_expiry() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(try_acquire_lease(&db, "t", "ch", "a", at(0), at(5)).await.unwrap());
        assert!(!try_acquire_lease(&db, "t", "ch", "b", at(1), at(6)).await.unwrap());
        // Same holder re-acquiring before expiry is refused too.
        assert!(!try_acquire_lease(&db, "t", "ch", "a", at(1), at(6)).await.unwrap());
        // After expiry the lease can be taken over.
        assert!(try_acquire_lease(&db, "t", "ch", "b", at(5), at(10)).await.unwrap());
    }

    #[tokio::test]
    async fn release_only_removes_own_lease() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(try_acquire_lease(&db, "t", "ch", "a", at(0), at(5)).await.unwrap());

        assert!(!release_lease(&db, "t", "ch", "b").await.unwrap());
        assert!(release_lease(&db, "t", "ch", "a").await.unwrap());
        // Idempotent.
        assert!(!release_lease(&db, "t", "ch", "a").await.unwrap());

        assert!(try_acquire_lease(&db, "t", "ch", "b", at(1), at(6)).await.unwrap());
    }

    #[tokio::test]
    async fn leases_are_scoped_per_tenant_and_channel() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(try_acquire_lease(&db, "t1", "ch", "a", at(0), at(5)).await.unwrap());
        assert!(try_acquire_lease(&db, "t2", "ch", "b", at(0), at(5)).await.unwrap());
        assert!(try_acquire_lease(&db, "t1", "ch2", "b", at(0), at(5)).await.unwrap());
    }
}
