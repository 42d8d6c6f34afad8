// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Creates follow-up tasks for conversations that went quiet.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use outpost_bus::{EventBus, EventKind};
use outpost_core::time::format_timestamp;
use outpost_core::{
    Conversation, FollowupRule, FollowupStatus, FollowupTask, MessageKind, NewOutboundMessage,
    OutpostError,
};
use outpost_storage::Database;
use outpost_storage::queries::{channels, conversations, followups, members, messages, outbox};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::template::{TemplateVars, first_name, render};

/// Counts reported by one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub created: usize,
    pub sent: usize,
}

impl std::ops::AddAssign for ScheduleSummary {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.sent += other.sent;
    }
}

/// Evaluates active follow-up rules against live conversations.
pub struct Scheduler {
    db: Database,
    bus: EventBus,
    outbox_max_retries: u32,
}

impl Scheduler {
    /// `outbox_max_retries` applies to outbox items created by auto-send.
    pub fn new(db: Database, bus: EventBus, outbox_max_retries: u32) -> Self {
        Self {
            db,
            bus,
            outbox_max_retries,
        }
    }

    /// Run every active rule once. A failing rule is logged and skipped.
    pub async fn run_scheduler_cycle(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ScheduleSummary, OutpostError> {
        let rules = followups::list_active_rules(&self.db).await?;
        let mut summary = ScheduleSummary::default();

        for rule in &rules {
            match self.apply_rule(rule, now).await {
                Ok(s) => summary += s,
                Err(e) => warn!(
                    rule_id = %rule.id,
                    tenant_id = %rule.tenant_id,
                    error = %e,
                    "follow-up rule failed"
                ),
            }
        }

        info!(
            rules = rules.len(),
            created = summary.created,
            sent = summary.sent,
            "follow-up scheduling complete"
        );
        Ok(summary)
    }

    async fn apply_rule(
        &self,
        rule: &FollowupRule,
        now: DateTime<Utc>,
    ) -> Result<ScheduleSummary, OutpostError> {
        let cutoff = Duration::try_minutes(rule.stale_threshold_minutes)
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut candidates =
            conversations::stale_conversations(&self.db, &rule.tenant_id, &rule.statuses, cutoff)
                .await?;

        if let Some(required) = rule.scenario.required_last_direction() {
            let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
            let directions = messages::latest_directions(&self.db, &ids).await?;
            candidates.retain(|c| directions.get(&c.id) == Some(&required));
        }
        if candidates.is_empty() {
            return Ok(ScheduleSummary::default());
        }

        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let existing = followups::tasks_for_rule(&self.db, &rule.id, &ids).await?;
        let mut active = HashSet::new();
        let mut attempts: HashMap<&str, u32> = HashMap::new();
        for task in &existing {
            if task.status.is_active() {
                active.insert(task.conversation_id.as_str());
            }
            let prior = attempts.entry(task.conversation_id.as_str()).or_default();
            *prior = (*prior).max(task.attempt);
        }

        let eligible: Vec<&Conversation> = candidates
            .iter()
            .filter(|c| !active.contains(c.id.as_str()))
            .filter(|c| attempts.get(c.id.as_str()).copied().unwrap_or(0) < rule.max_attempts)
            .collect();
        if eligible.is_empty() {
            debug!(rule_id = %rule.id, candidates = candidates.len(), "no eligible conversations");
            return Ok(ScheduleSummary::default());
        }

        let owners = self.channel_owners(&eligible).await?;
        let stamp = format_timestamp(now);
        let tasks: Vec<FollowupTask> = eligible
            .iter()
            .map(|c| FollowupTask {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: rule.tenant_id.clone(),
                rule_id: rule.id.clone(),
                conversation_id: c.id.clone(),
                status: FollowupStatus::Pending,
                attempt: attempts.get(c.id.as_str()).copied().unwrap_or(0) + 1,
                scheduled_at: stamp.clone(),
                sent_at: None,
                responded_at: None,
                assigned_to: c
                    .assigned_to
                    .clone()
                    .or_else(|| owners.get(&c.channel_id).cloned().flatten()),
                message: None,
                created_at: stamp.clone(),
                updated_at: stamp.clone(),
            })
            .collect();
        followups::insert_tasks(&self.db, &tasks).await?;

        for task in &tasks {
            self.bus.publish(
                &task.tenant_id,
                EventKind::FollowupCreated {
                    task_id: task.id.clone(),
                    rule_id: task.rule_id.clone(),
                    conversation_id: task.conversation_id.clone(),
                    attempt: task.attempt,
                },
            );
        }

        let mut summary = ScheduleSummary {
            created: tasks.len(),
            sent: 0,
        };

        let template = rule
            .template
            .as_deref()
            .filter(|t| rule.auto_send && !t.trim().is_empty());
        if let Some(template) = template {
            let assignee_ids: Vec<String> = tasks
                .iter()
                .filter_map(|t| t.assigned_to.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let names = members::member_names(&self.db, &rule.tenant_id, &assignee_ids).await?;

            for (task, conversation) in tasks.iter().zip(&eligible) {
                let assignee = task.assigned_to.as_ref().and_then(|id| names.get(id));
                let vars = TemplateVars {
                    recipient_name: first_name(conversation.display_name.as_deref()),
                    assignee_name: assignee.map(String::as_str),
                };
                match self.auto_send(task, template, &vars, now).await {
                    Ok(()) => summary.sent += 1,
                    Err(e) => warn!(
                        task_id = %task.id,
                        conversation_id = %task.conversation_id,
                        error = %e,
                        "follow-up auto-send failed"
                    ),
                }
            }
        }

        info!(
            rule_id = %rule.id,
            scenario = %rule.scenario,
            created = summary.created,
            sent = summary.sent,
            "follow-up rule applied"
        );
        Ok(summary)
    }

    async fn auto_send(
        &self,
        task: &FollowupTask,
        template: &str,
        vars: &TemplateVars<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), OutpostError> {
        let text = render(template, vars)?;
        let (_, item) = outbox::enqueue_message(
            &self.db,
            &NewOutboundMessage {
                conversation_id: task.conversation_id.clone(),
                kind: MessageKind::Text,
                content: Some(text.clone()),
                media_url: None,
                file_name: None,
                max_retries: self.outbox_max_retries,
            },
            now,
        )
        .await?;
        followups::mark_task_sent(&self.db, &task.id, &text, now).await?;

        self.bus.publish(
            &task.tenant_id,
            EventKind::FollowupAutoSent {
                task_id: task.id.clone(),
                conversation_id: task.conversation_id.clone(),
                outbox_item_id: item.id,
            },
        );
        Ok(())
    }

    async fn channel_owners(
        &self,
        eligible: &[&Conversation],
    ) -> Result<HashMap<String, Option<String>>, OutpostError> {
        let mut owners = HashMap::new();
        for c in eligible.iter().filter(|c| c.assigned_to.is_none()) {
            if owners.contains_key(&c.channel_id) {
                continue;
            }
            let owner = channels::get_channel(&self.db, &c.channel_id)
                .await?
                .and_then(|ch| ch.owner_id);
            owners.insert(c.channel_id.clone(), owner);
        }
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::{Direction, FollowupScenario, OutboxStatus};
    use outpost_test_utils::{TENANT, TestHarness};

    fn rule(id: &str, scenario: FollowupScenario, template: Option<&str>) -> FollowupRule {
        FollowupRule {
            id: id.into(),
            tenant_id: TENANT.into(),
            name: format!("rule {id}"),
            statuses: vec!["open".into()],
            scenario,
            stale_threshold_minutes: 60,
            max_attempts: 3,
            auto_send: template.is_some(),
            template: template.map(str::to_string),
            active: true,
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    fn scheduler(h: &TestHarness) -> Scheduler {
        Scheduler::new(h.db.clone(), h.bus.clone(), h.config.dispatch.max_retries)
    }

    #[tokio::test]
    async fn client_silent_rule_auto_sends_rendered_template() {
        let mut h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let conv = h
            .seed_conversation("ch-1", "5511999990000", Some("Maria Souza"))
            .await
            .unwrap();
        let now = Utc::now();
        h.seed_message(&conv, Direction::Inbound, "preciso de ajuda", now - Duration::minutes(90))
            .await
            .unwrap();
        h.seed_message(&conv, Direction::Outbound, "claro!", now - Duration::minutes(85))
            .await
            .unwrap();
        followups::create_rule(
            &h.db,
            &rule("r-1", FollowupScenario::ClientSilent, Some("Olá {nome}, ainda podemos ajudar?")),
        )
        .await
        .unwrap();

        let s = scheduler(&h).run_scheduler_cycle(now).await.unwrap();
        assert_eq!(s, ScheduleSummary { created: 1, sent: 1 });

        let tasks = followups::tasks_for_rule(&h.db, "r-1", &[conv.id.clone()]).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].attempt, 1);
        assert_eq!(tasks[0].status, FollowupStatus::Sent);
        assert_eq!(tasks[0].message.as_deref(), Some("Olá Maria, ainda podemos ajudar?"));
        assert!(tasks[0].sent_at.is_some());

        let items = outbox::items_for_conversation(&h.db, &conv.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].channel_id, "ch-1");
        assert_eq!(items[0].status, OutboxStatus::Pending);
        assert_eq!(items[0].content.as_deref(), Some("Olá Maria, ainda podemos ajudar?"));

        let kinds: Vec<_> = h.drain_events().into_iter().map(|e| e.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, EventKind::FollowupCreated { attempt: 1, .. })));
        assert!(kinds.iter().any(|k| matches!(k, EventKind::FollowupAutoSent { .. })));
    }

    #[tokio::test]
    async fn direction_filter_and_threshold() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let now = Utc::now();
        let customer_last = h.seed_conversation("ch-1", "5511000000001", None).await.unwrap();
        h.seed_message(&customer_last, Direction::Inbound, "oi", now - Duration::minutes(120))
            .await
            .unwrap();
        let team_last = h.seed_conversation("ch-1", "5511000000002", None).await.unwrap();
        h.seed_message(&team_last, Direction::Outbound, "oi", now - Duration::minutes(120))
            .await
            .unwrap();
        let recent = h.seed_conversation("ch-1", "5511000000003", None).await.unwrap();
        h.seed_message(&recent, Direction::Inbound, "oi", now - Duration::minutes(10))
            .await
            .unwrap();

        followups::create_rule(&h.db, &rule("r-team", FollowupScenario::TeamSilent, None))
            .await
            .unwrap();
        let s = scheduler(&h).run_scheduler_cycle(now).await.unwrap();
        assert_eq!(s, ScheduleSummary { created: 1, sent: 0 });

        let ids = vec![customer_last.id.clone(), team_last.id.clone(), recent.id.clone()];
        let tasks = followups::tasks_for_rule(&h.db, "r-team", &ids).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].conversation_id, customer_last.id);
        assert_eq!(tasks[0].status, FollowupStatus::Pending);
    }

    #[tokio::test]
    async fn active_task_blocks_duplicates_and_attempts_are_capped() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let conv = h.seed_conversation("ch-1", "5511999990000", None).await.unwrap();
        let now = Utc::now();
        h.seed_message(&conv, Direction::Inbound, "oi", now - Duration::minutes(120))
            .await
            .unwrap();
        let mut r = rule("r-1", FollowupScenario::ConversationStalled, None);
        r.max_attempts = 2;
        followups::create_rule(&h.db, &r).await.unwrap();
        let sched = scheduler(&h);

        assert_eq!(sched.run_scheduler_cycle(now).await.unwrap().created, 1);
        assert_eq!(sched.run_scheduler_cycle(now).await.unwrap().created, 0);

        let first = followups::tasks_for_rule(&h.db, "r-1", &[conv.id.clone()]).await.unwrap();
        followups::resolve_tasks(&h.db, &[first[0].id.clone()], now).await.unwrap();
        assert_eq!(sched.run_scheduler_cycle(now).await.unwrap().created, 1);

        let second = followups::tasks_for_rule(&h.db, "r-1", &[conv.id.clone()]).await.unwrap();
        let newest = second.iter().max_by_key(|t| t.attempt).unwrap();
        assert_eq!(newest.attempt, 2);
        followups::resolve_tasks(&h.db, &[newest.id.clone()], now).await.unwrap();

        // Two attempts used up.
        assert_eq!(sched.run_scheduler_cycle(now).await.unwrap().created, 0);
    }

    #[tokio::test]
    async fn assignee_falls_back_to_channel_owner() {
        let h = TestHarness::new().await.unwrap();
        h.seed_member("m-1", "Carlos Lima").await.unwrap();
        h.seed_channel_with("ch-1", outpost_core::ChannelStatus::Connected, Some("m-1"))
            .await
            .unwrap();
        let conv = h.seed_conversation("ch-1", "5511999990000", Some("Ana")).await.unwrap();
        let now = Utc::now();
        h.seed_message(&conv, Direction::Inbound, "oi", now - Duration::minutes(120))
            .await
            .unwrap();
        followups::create_rule(
            &h.db,
            &rule("r-1", FollowupScenario::TeamSilent, Some("{{nome}}, {responsavel} retorna já.")),
        )
        .await
        .unwrap();

        scheduler(&h).run_scheduler_cycle(now).await.unwrap();
        let tasks = followups::tasks_for_rule(&h.db, "r-1", &[conv.id.clone()]).await.unwrap();
        assert_eq!(tasks[0].assigned_to.as_deref(), Some("m-1"));
        assert_eq!(tasks[0].message.as_deref(), Some("Ana, Carlos Lima retorna já."));
    }

    #[tokio::test]
    async fn render_failure_keeps_task_pending_and_other_sends_going() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let now = Utc::now();
        let named = h.seed_conversation("ch-1", "5511000000001", Some("Maria")).await.unwrap();
        let anonymous = h.seed_conversation("ch-1", "5511000000002", None).await.unwrap();
        for c in [&named, &anonymous] {
            h.seed_message(c, Direction::Outbound, "oi", now - Duration::minutes(120))
                .await
                .unwrap();
        }
        followups::create_rule(&h.db, &rule("r-1", FollowupScenario::ClientSilent, Some("{nome}")))
            .await
            .unwrap();

        let s = scheduler(&h).run_scheduler_cycle(now).await.unwrap();
        assert_eq!(s, ScheduleSummary { created: 2, sent: 1 });

        let ids = vec![named.id.clone(), anonymous.id.clone()];
        let tasks = followups::tasks_for_rule(&h.db, "r-1", &ids).await.unwrap();
        let status_of = |id: &str| tasks.iter().find(|t| t.conversation_id == id).unwrap().status;
        assert_eq!(status_of(&named.id), FollowupStatus::Sent);
        assert_eq!(status_of(&anonymous.id), FollowupStatus::Pending);
        assert!(
            outbox::items_for_conversation(&h.db, &anonymous.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn status_filter_limits_candidates() {
        let h = TestHarness::new().await.unwrap();
        h.seed_channel("ch-1").await.unwrap();
        let conv = h.seed_conversation("ch-1", "5511999990000", None).await.unwrap();
        let now = Utc::now();
        h.seed_message(&conv, Direction::Inbound, "oi", now - Duration::minutes(120))
            .await
            .unwrap();
        let mut r = rule("r-1", FollowupScenario::ConversationStalled, None);
        r.statuses = vec!["negotiating".into()];
        followups::create_rule(&h.db, &r).await.unwrap();

        let s = scheduler(&h).run_scheduler_cycle(now).await.unwrap();
        assert_eq!(s.created, 0);
    }
}
