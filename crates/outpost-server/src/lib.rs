// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP interface for the Outpost message pipeline.
//!
//! Provider webhooks land on `POST /webhooks/{channel_id}` and are stored for
//! the ingest cycle. Each pipeline cycle has a bearer-protected trigger
//! endpoint under `/v1/`.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{AppState, build_router, start_server};
