// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The outbox dispatch cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use outpost_bus::{EventBus, EventKind};
use outpost_config::DispatchConfig;
use outpost_core::{
    Channel, ChannelStatus, GatewayClient, GatewayError, OutboundPayload, OutboxItem, OutpostError,
};
use outpost_storage::Database;
use outpost_storage::queries::{channels, outbox};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::locks::ChannelLockManager;

/// Counts reported by one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Items the gateway accepted.
    pub sent: usize,
    /// Failed attempts, retryable or terminal, including items failed for
    /// channel misconfiguration.
    pub failed: usize,
    /// Channels passed over because another cycle holds their lease.
    pub skipped: usize,
}

/// Delivers queued outbox items through a [`GatewayClient`].
pub struct Dispatcher {
    db: Database,
    gateway: Arc<dyn GatewayClient>,
    locks: ChannelLockManager,
    bus: EventBus,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        gateway: Arc<dyn GatewayClient>,
        bus: EventBus,
        config: DispatchConfig,
    ) -> Self {
        let locks = ChannelLockManager::new(db.clone(), Duration::from_secs(config.lock_ttl_secs));
        Self {
            db,
            gateway,
            locks,
            bus,
            config,
        }
    }

    /// Run one cycle over at most `max_channels` connected channels, sending
    /// up to `items_per_channel` items from each.
    pub async fn run_dispatch_cycle(
        &self,
        max_channels: usize,
        items_per_channel: usize,
    ) -> Result<DispatchSummary, OutpostError> {
        self.run_dispatch_cycle_at(max_channels, items_per_channel, Utc::now())
            .await
    }

    /// [`Self::run_dispatch_cycle`] with an explicit clock reading.
    pub async fn run_dispatch_cycle_at(
        &self,
        max_channels: usize,
        items_per_channel: usize,
        now: DateTime<Utc>,
    ) -> Result<DispatchSummary, OutpostError> {
        let cutoff = chrono::Duration::try_minutes(self.config.stale_sending_minutes)
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let recovered = outbox::recover_stale_sending(&self.db, cutoff, now).await?;
        if recovered > 0 {
            warn!(recovered, "returned stale sending items to the queue");
        }

        let mut ready = channels::list_channels_by_status(&self.db, ChannelStatus::Connected).await?;
        shuffle_and_cap(&mut ready, max_channels, &mut rand::thread_rng());

        let mut summary = DispatchSummary::default();
        for channel in &ready {
            if !self.locks.try_acquire_at(&channel.tenant_id, &channel.id, now).await? {
                summary.skipped += 1;
                self.bus.publish(
                    &channel.tenant_id,
                    EventKind::ChannelSkipped {
                        channel_id: channel.id.clone(),
                        reason: "lease held by another dispatch cycle".into(),
                    },
                );
                continue;
            }

            let result = self
                .dispatch_channel(channel, items_per_channel, now, &mut summary)
                .await;
            self.locks.release(&channel.tenant_id, &channel.id).await;

            if let Err(e) = result {
                warn!(channel_id = %channel.id, error = %e, "channel dispatch aborted");
            }
        }

        info!(
            channels = ready.len(),
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            "dispatch cycle complete"
        );
        Ok(summary)
    }

    async fn dispatch_channel(
        &self,
        channel: &Channel,
        limit: usize,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<(), OutpostError> {
        if let Err(err) = self.gateway.check_channel(channel) {
            let failed = self.fail_ready_items(channel, &err, limit, now).await?;
            summary.failed += failed;
            warn!(channel_id = %channel.id, error = %err, failed, "channel misconfigured");
            self.bus.publish(
                &channel.tenant_id,
                EventKind::ChannelMisconfigured {
                    channel_id: channel.id.clone(),
                    error: err.to_string(),
                    failed_items: failed,
                },
            );
            return Ok(());
        }

        let items = outbox::fetch_ready(&self.db, &channel.id, now, limit).await?;
        if items.is_empty() {
            debug!(channel_id = %channel.id, "no ready items");
            return Ok(());
        }

        for item in items {
            if !outbox::claim_item(&self.db, &item.id, now).await? {
                debug!(item_id = %item.id, "item claimed by another cycle");
                continue;
            }

            match self.gateway.send(channel, &OutboundPayload::from(&item)).await {
                Ok(receipt) => {
                    outbox::mark_sent(&self.db, &item, receipt.provider_message_id.as_deref(), now)
                        .await?;
                    summary.sent += 1;
                    debug!(
                        item_id = %item.id,
                        provider_message_id = ?receipt.provider_message_id,
                        "item sent"
                    );
                    self.bus.publish(
                        &item.tenant_id,
                        EventKind::OutboxSent {
                            item_id: item.id.clone(),
                            channel_id: item.channel_id.clone(),
                            provider_message_id: receipt.provider_message_id,
                        },
                    );
                }
                Err(err) => {
                    self.record_failure(&item, &err, now).await?;
                    summary.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Count the attempt, then either requeue the item with backoff or fail it.
    async fn record_failure(
        &self,
        item: &OutboxItem,
        err: &GatewayError,
        now: DateTime<Utc>,
    ) -> Result<(), OutpostError> {
        let retry_count = item.retry_count + 1;
        let terminal = !err.is_retryable() || retry_count >= item.max_retries;
        let error = err.to_string();

        if terminal {
            outbox::mark_failed(&self.db, item, &error, now).await?;
            warn!(item_id = %item.id, retry_count, error = %error, "item failed permanently");
        } else {
            let delay = backoff_delay(
                self.config.retry_backoff_secs,
                self.config.max_backoff_secs,
                retry_count,
            );
            let retry_at = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(now);
            outbox::reschedule_item(&self.db, &item.id, &error, retry_at, now).await?;
            warn!(
                item_id = %item.id,
                retry_count,
                retry_in_secs = delay.as_secs(),
                error = %error,
                "send failed, will retry"
            );
        }

        self.bus.publish(
            &item.tenant_id,
            EventKind::OutboxFailed {
                item_id: item.id.clone(),
                channel_id: item.channel_id.clone(),
                error,
                retry_count,
                terminal,
            },
        );
        Ok(())
    }

    /// Fail every ready item of a channel whose endpoint cannot be resolved.
    async fn fail_ready_items(
        &self,
        channel: &Channel,
        err: &GatewayError,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<usize, OutpostError> {
        let error = err.to_string();
        let mut failed = 0;
        for item in outbox::fetch_ready(&self.db, &channel.id, now, limit).await? {
            if outbox::claim_item(&self.db, &item.id, now).await?
                && outbox::mark_failed(&self.db, &item, &error, now).await?
            {
                failed += 1;
            }
        }
        Ok(failed)
    }
}

/// Shuffle candidate channels and keep the first `max`.
pub fn shuffle_and_cap<T, R: Rng + ?Sized>(channels: &mut Vec<T>, max: usize, rng: &mut R) {
    channels.shuffle(rng);
    channels.truncate(max);
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max`.
pub fn backoff_delay(base_secs: u64, max_secs: u64, attempt: u32) -> Duration {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_secs(base_secs.saturating_mul(factor).min(max_secs))
}
