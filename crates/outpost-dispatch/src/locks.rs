// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel advisory lock backed by lease rows.
//!
//! [`ChannelLockManager::try_acquire`] never waits: a held lease means the
//! caller skips the channel for this cycle. Leases expire after the configured
//! TTL so a process that dies while holding one only blocks its channel until
//! the lease runs out.

use std::time::Duration;

use chrono::{DateTime, Utc};
use outpost_core::OutpostError;
use outpost_storage::Database;
use outpost_storage::queries::locks;
use tracing::{debug, warn};

/// Grants and releases channel leases on behalf of one dispatcher instance.
#[derive(Debug, Clone)]
pub struct ChannelLockManager {
    db: Database,
    holder: String,
    ttl: chrono::Duration,
}

impl ChannelLockManager {
    /// Create a manager with a fresh holder identity.
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self {
            db,
            holder: format!("dispatch-{}", uuid::Uuid::new_v4()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    /// Identity written into lease rows held by this manager.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Take the lease on `(tenant_id, channel_id)` if it is free or expired.
    pub async fn try_acquire(&self, tenant_id: &str, channel_id: &str) -> Result<bool, OutpostError> {
        self.try_acquire_at(tenant_id, channel_id, Utc::now()).await
    }

    pub async fn try_acquire_at(
        &self,
        tenant_id: &str,
        channel_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, OutpostError> {
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(now);
        let acquired =
            locks::try_acquire_lease(&self.db, tenant_id, channel_id, &self.holder, now, expires_at)
                .await?;
        if !acquired {
            debug!(tenant_id, channel_id, "channel lease held elsewhere");
        }
        Ok(acquired)
    }

    /// Give the lease back. Idempotent; errors are logged, never returned.
    pub async fn release(&self, tenant_id: &str, channel_id: &str) {
        match locks::release_lease(&self.db, tenant_id, channel_id, &self.holder).await {
            Ok(true) => {}
            Ok(false) => debug!(tenant_id, channel_id, "no lease to release"),
            Err(e) => warn!(tenant_id, channel_id, error = %e, "failed to release channel lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::{Channel, ChannelStatus};
    use outpost_storage::queries::channels;

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        channels::create_channel(
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

    #[tokio::test]
    async fn second_holder_is_refused_until_release() {
        let db = setup().await;
        let a = ChannelLockManager::new(db.clone(), Duration::from_secs(300));
        let b = ChannelLockManager::new(db.clone(), Duration::from_secs(300));
        assert_ne!(a.holder(), b.holder());

        assert!(a.try_acquire("t-1", "ch-1").await.unwrap());
        assert!(!b.try_acquire("t-1", "ch-1").await.unwrap());
        assert!(!a.try_acquire("t-1", "ch-1").await.unwrap());

        a.release("t-1", "ch-1").await;
        assert!(b.try_acquire("t-1", "ch-1").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let db = setup().await;
        let crashed = ChannelLockManager::new(db.clone(), Duration::from_secs(60));
        let fresh = ChannelLockManager::new(db.clone(), Duration::from_secs(60));
        let t0 = Utc::now();

        assert!(crashed.try_acquire_at("t-1", "ch-1", t0).await.unwrap());
        assert!(
            !fresh
                .try_acquire_at("t-1", "ch-1", t0 + chrono::Duration::seconds(30))
                .await
                .unwrap()
        );
        assert!(
            fresh
                .try_acquire_at("t-1", "ch-1", t0 + chrono::Duration::seconds(61))
                .await
                .unwrap()
        );

        // The crashed holder's late release must not free the new lease.
        crashed.release("t-1", "ch-1").await;
        assert!(!crashed.try_acquire_at("t-1", "ch-1", t0 + chrono::Duration::seconds(62)).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let db = setup().await;
        let lock = ChannelLockManager::new(db.clone(), Duration::from_secs(300));
        lock.release("t-1", "ch-1").await;
        assert!(lock.try_acquire("t-1", "ch-1").await.unwrap());
        lock.release("t-1", "ch-1").await;
        lock.release("t-1", "ch-1").await;
        assert!(lock.try_acquire("t-1", "ch-1").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn leases_are_scoped_per_tenant_and_channel() {
        let db = setup().await;
        let a = ChannelLockManager::new(db.clone(), Duration::from_secs(300));
        let b = ChannelLockManager::new(db.clone(), Duration::from_secs(300));
        assert!(a.try_acquire("t-1", "ch-1").await.unwrap());
        assert!(b.try_acquire("t-2", "ch-1").await.unwrap());
        assert!(b.try_acquire("t-1", "ch-2").await.unwrap());
        db.close().await.unwrap();
    }
}
