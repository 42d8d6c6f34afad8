// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion for the Outpost message pipeline.
//!
//! Provider callbacks are appended to the `webhook_events` table as they
//! arrive and applied here in batches. Each event is handled on its own: a
//! malformed or failing event records its error and retry count and never
//! aborts the rest of the batch. Events past the retry ceiling stay
//! unprocessed for inspection.

pub mod events;
pub mod ingestor;

pub use events::{IngestEvent, is_broadcast, normalize_kind};
pub use ingestor::{IngestSummary, Ingestor};
