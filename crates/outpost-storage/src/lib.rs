// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Outpost message pipeline.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer connection via
//! `tokio-rusqlite`. Query modules expose typed operations for channels,
//! conversations, messages, the outbox, webhook events, follow-ups, and
//! channel leases. All functions take `&Database` and are tenant-agnostic;
//! callers scope by tenant where the query accepts one.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
pub use queries::followups::CancelOutcome;
pub use queries::messages::{IncomingMessage, RecordOutcome};
