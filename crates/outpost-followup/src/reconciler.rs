// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolves active follow-up tasks once the conversation moved on.
//!
//! A customer reply newer than the task resolves it whatever the scenario.
//! For `team_silent` tasks a newer team message resolves it as well.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use outpost_bus::{EventBus, EventKind};
use outpost_config::ReconcileAnchor;
use outpost_core::{Direction, FollowupScenario, FollowupTask, OutpostError};
use outpost_storage::Database;
use outpost_storage::queries::{followups, messages};
use tracing::info;

pub struct Reconciler {
    db: Database,
    bus: EventBus,
    anchor: ReconcileAnchor,
}

impl Reconciler {
    pub fn new(db: Database, bus: EventBus, anchor: ReconcileAnchor) -> Self {
        Self { db, bus, anchor }
    }

    /// Resolve every active task with newer activity. Returns the number resolved.
    pub async fn run_reconcile_cycle(&self, now: DateTime<Utc>) -> Result<usize, OutpostError> {
        let active = followups::active_tasks_with_scenario(&self.db).await?;
        if active.is_empty() {
            return Ok(0);
        }

        let conversation_ids: Vec<String> = active
            .iter()
            .map(|(t, _)| t.conversation_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let inbound =
            messages::latest_activity(&self.db, &conversation_ids, Direction::Inbound).await?;
        let outbound =
            messages::latest_activity(&self.db, &conversation_ids, Direction::Outbound).await?;

        let resolved: Vec<&FollowupTask> = active
            .iter()
            .filter(|(task, scenario)| {
                let anchor = self.anchor_of(task);
                let newer = |latest: Option<&String>| latest.is_some_and(|at| at.as_str() > anchor);
                newer(inbound.get(&task.conversation_id))
                    || (*scenario == FollowupScenario::TeamSilent
                        && newer(outbound.get(&task.conversation_id)))
            })
            .map(|(task, _)| task)
            .collect();

        let ids: Vec<String> = resolved.iter().map(|t| t.id.clone()).collect();
        let count = followups::resolve_tasks(&self.db, &ids, now).await?;
        for task in &resolved {
            self.bus.publish(
                &task.tenant_id,
                EventKind::FollowupResolved {
                    task_id: task.id.clone(),
                    conversation_id: task.conversation_id.clone(),
                },
            );
        }

        info!(active = active.len(), resolved = count, "follow-up reconciliation complete");
        Ok(count)
    }

    /// Timestamps share one fixed-width format, so string order is time order.
    fn anchor_of<'a>(&self, task: &'a FollowupTask) -> &'a str {
        match self.anchor {
            ReconcileAnchor::CreatedAt => &task.created_at,
            ReconcileAnchor::SentAt => task.sent_at.as_deref().unwrap_or(&task.scheduled_at),
        }
    }
}
