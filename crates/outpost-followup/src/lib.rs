// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up automation for stale conversations.
//!
//! [`Scheduler`] turns active rules into tasks (and, for auto-send rules,
//! queued outbox messages). [`Reconciler`] resolves tasks once newer
//! conversation activity shows up. [`FollowupCycle`] runs both in that order.

pub mod cycle;
pub mod reconciler;
pub mod scheduler;
pub mod template;

pub use cycle::{FollowupCycle, FollowupSummary};
pub use reconciler::Reconciler;
pub use scheduler::{ScheduleSummary, Scheduler};
pub use template::{TemplateVars, first_name, render};
