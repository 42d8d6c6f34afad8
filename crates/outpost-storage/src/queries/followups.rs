// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up rules and tasks.

use chrono::{DateTime, Utc};
use outpost_core::time::format_timestamp;
use outpost_core::{FollowupScenario, OutpostError};
use rusqlite::{OptionalExtension, params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::models::{
    FollowupRule, FollowupTask, RULE_COLUMNS, TASK_COLUMNS, get_enum, placeholders,
    rule_from_row, task_from_row,
};

/// Result of [`cancel_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    /// The task was already responded or cancelled.
    AlreadyTerminal,
}

/// Insert a rule.
pub async fn create_rule(db: &Database, rule: &FollowupRule) -> Result<(), OutpostError> {
    let r = rule.clone();
    let statuses = serde_json::to_string(&r.statuses).map_err(|e| OutpostError::Storage {
        source: Box::new(e),
    })?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO followup_rules (id, tenant_id, name, statuses, scenario,
                     stale_threshold_minutes, max_attempts, auto_send, template, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    r.id,
                    r.tenant_id,
                    r.name,
                    statuses,
                    r.scenario.to_string(),
                    r.stale_threshold_minutes,
                    r.max_attempts,
                    r.auto_send,
                    r.template,
                    r.active,
                    r.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Active rules of every tenant.
pub async fn list_active_rules(db: &Database) -> Result<Vec<FollowupRule>, OutpostError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RULE_COLUMNS} FROM followup_rules WHERE active = 1
                 ORDER BY tenant_id, created_at, id"
            ))?;
            let rows = stmt.query_map([], rule_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Every task of `rule_id` for the given conversations.
pub async fn tasks_for_rule(
    db: &Database,
    rule_id: &str,
    conversation_ids: &[String],
) -> Result<Vec<FollowupTask>, OutpostError> {
    if conversation_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = vec![rule_id.to_string()];
    args.extend(conversation_ids.iter().cloned());
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM followup_tasks
         WHERE rule_id = ?1 AND conversation_id IN ({})",
        placeholders(2, conversation_ids.len())
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), task_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a batch of tasks in one transaction.
pub async fn insert_tasks(db: &Database, tasks: &[FollowupTask]) -> Result<(), OutpostError> {
    if tasks.is_empty() {
        return Ok(());
    }
    let tasks = tasks.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO followup_tasks (id, tenant_id, rule_id, conversation_id, status,
                         attempt, scheduled_at, sent_at, responded_at, assigned_to, message,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?;
                for t in &tasks {
                    stmt.execute(params![
                        t.id,
                        t.tenant_id,
                        t.rule_id,
                        t.conversation_id,
                        t.status.to_string(),
                        t.attempt,
                        t.scheduled_at,
                        t.sent_at,
                        t.responded_at,
                        t.assigned_to,
                        t.message,
                        t.created_at,
                        t.updated_at,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record an auto-sent message on a pending task.
pub async fn mark_task_sent(
    db: &Database,
    id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<bool, OutpostError> {
    let id = id.to_string();
    let message = message.to_string();
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE followup_tasks SET status = 'sent', sent_at = ?3, message = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, message, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Pending and sent tasks with their rule's scenario.
pub async fn active_tasks_with_scenario(
    db: &Database,
) -> Result<Vec<(FollowupTask, FollowupScenario)>, OutpostError> {
    let columns = TASK_COLUMNS
        .split(", ")
        .map(|c| format!("t.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns}, r.scenario FROM followup_tasks t
         JOIN followup_rules r ON r.id = t.rule_id
         WHERE t.status IN ('pending', 'sent')
         ORDER BY t.created_at"
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| Ok((task_from_row(row)?, get_enum(row, 13)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Mark tasks responded in one statement. Tasks already terminal are left alone.
pub async fn resolve_tasks(
    db: &Database,
    ids: &[String],
    now: DateTime<Utc>,
) -> Result<usize, OutpostError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut args = vec![format_timestamp(now)];
    args.extend(ids.iter().cloned());
    let sql = format!(
        "UPDATE followup_tasks SET status = 'responded', responded_at = ?1, updated_at = ?1
         WHERE status IN ('pending', 'sent') AND id IN ({})",
        placeholders(2, ids.len())
    );
    db.connection()
        .call(move |conn| conn.execute(&sql, params_from_iter(args.iter())))
        .await
        .map_err(map_tr_err)
}

/// Cancel an active task.
pub async fn cancel_task(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<CancelOutcome, OutpostError> {
    let id = id.to_string();
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE followup_tasks SET status = 'cancelled', updated_at = ?2
                 WHERE id = ?1 AND status IN ('pending', 'sent')",
                params![id, now],
            )?;
            if changed == 1 {
                return Ok(CancelOutcome::Cancelled);
            }
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM followup_tasks WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(match exists {
                Some(_) => CancelOutcome::AlreadyTerminal,
                None => CancelOutcome::NotFound,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Get a task by ID.
pub async fn get_task(db: &Database, id: &str) -> Result<Option<FollowupTask>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM followup_tasks WHERE id = ?1"),
                params![id],
                task_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
