// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot cycle subcommands.

use std::sync::Arc;

use outpost_bus::{EventBus, spawn_log_worker};
use outpost_config::OutpostConfig;
use outpost_core::{GatewayClient, OutpostError};
use outpost_dispatch::Dispatcher;
use outpost_followup::FollowupCycle;
use outpost_ingest::Ingestor;
use outpost_storage::Database;
use outpost_whatsapp::EvolutionClient;
use serde::Serialize;
use tokio::task::JoinHandle;

/// Database and event bus shared by every subcommand.
pub(crate) struct Runtime {
    pub db: Database,
    pub bus: EventBus,
    log_worker: JoinHandle<()>,
}

impl Runtime {
    pub async fn open(config: &OutpostConfig) -> Result<Self, OutpostError> {
        let db = Database::from_config(&config.storage).await?;
        let (bus, rx) = EventBus::new(config.events.capacity);
        Ok(Self {
            db,
            bus,
            log_worker: spawn_log_worker(rx),
        })
    }

    pub fn gateway(config: &OutpostConfig) -> Result<Arc<dyn GatewayClient>, OutpostError> {
        Ok(Arc::new(EvolutionClient::new(&config.whatsapp)?))
    }

    /// Flush pending bus events and close the database.
    ///
    /// Every component holding a bus clone must be dropped first, otherwise
    /// the log worker never sees the channel close.
    pub async fn shutdown(self) -> Result<(), OutpostError> {
        let dropped = self.bus.dropped();
        drop(self.bus);
        if let Err(e) = self.log_worker.await {
            tracing::warn!(error = %e, "event log worker did not finish cleanly");
        }
        if dropped > 0 {
            tracing::warn!(dropped, "event bus was full; some events were not logged");
        }
        self.db.close().await
    }
}

fn print_summary<T: Serialize>(summary: &T) -> Result<(), OutpostError> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| OutpostError::Internal(format!("failed to encode summary: {e}")))?;
    println!("{json}");
    Ok(())
}

pub async fn run_dispatch(
    config: OutpostConfig,
    max_channels: Option<usize>,
    items_per_channel: Option<usize>,
) -> Result<(), OutpostError> {
    let runtime = Runtime::open(&config).await?;
    let summary = {
        let dispatcher = Dispatcher::new(
            runtime.db.clone(),
            Runtime::gateway(&config)?,
            runtime.bus.clone(),
            config.dispatch.clone(),
        );
        dispatcher
            .run_dispatch_cycle(
                max_channels.unwrap_or(config.dispatch.max_channels),
                items_per_channel.unwrap_or(config.dispatch.items_per_channel),
            )
            .await?
    };
    print_summary(&summary)?;
    runtime.shutdown().await
}

pub async fn run_ingest(config: OutpostConfig, batch_size: Option<usize>) -> Result<(), OutpostError> {
    let runtime = Runtime::open(&config).await?;
    let summary = {
        let ingestor = Ingestor::new(
            runtime.db.clone(),
            runtime.bus.clone(),
            config.ingest.max_retries,
        );
        ingestor
            .run_ingest_cycle(batch_size.unwrap_or(config.ingest.batch_size))
            .await?
    };
    print_summary(&summary)?;
    runtime.shutdown().await
}

/// Follow-up messages are only queued here; run `outpost dispatch` to send them.
pub async fn run_followup(config: OutpostConfig) -> Result<(), OutpostError> {
    let runtime = Runtime::open(&config).await?;
    let summary = {
        let cycle = FollowupCycle::new(
            runtime.db.clone(),
            runtime.bus.clone(),
            &config.followup,
            &config.dispatch,
        );
        cycle.run_followup_cycle().await?
    };
    print_summary(&summary)?;
    runtime.shutdown().await
}
