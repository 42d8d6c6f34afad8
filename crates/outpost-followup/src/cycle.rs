// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconcile-then-schedule follow-up cycle.

use chrono::{DateTime, Utc};
use outpost_bus::EventBus;
use outpost_config::{DispatchConfig, FollowupConfig};
use outpost_core::OutpostError;
use outpost_storage::Database;
use serde::Serialize;

use crate::reconciler::Reconciler;
use crate::scheduler::Scheduler;

/// Counts reported by one follow-up cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FollowupSummary {
    pub created: usize,
    pub sent: usize,
    pub reconciled: usize,
}

/// Runs the reconciler and then the scheduler.
///
/// Reconciling first clears tasks already answered, so a fresh silence window
/// is not blocked by a task that only looks active.
pub struct FollowupCycle {
    scheduler: Scheduler,
    reconciler: Reconciler,
}

impl FollowupCycle {
    pub fn new(
        db: Database,
        bus: EventBus,
        followup: &FollowupConfig,
        dispatch: &DispatchConfig,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(db.clone(), bus.clone(), dispatch.max_retries),
            reconciler: Reconciler::new(db, bus, followup.reconcile_anchor),
        }
    }

    pub async fn run_followup_cycle(&self) -> Result<FollowupSummary, OutpostError> {
        self.run_followup_cycle_at(Utc::now()).await
    }

    pub async fn run_followup_cycle_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<FollowupSummary, OutpostError> {
        let reconciled = self.reconciler.run_reconcile_cycle(now).await?;
        let scheduled = self.scheduler.run_scheduler_cycle(now).await?;
        Ok(FollowupSummary {
            created: scheduled.created,
            sent: scheduled.sent,
            reconciled,
        })
    }
}
