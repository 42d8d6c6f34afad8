// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Outpost integration tests.
//!
//! Provides a mock gateway and a seeded temp-database harness for fast,
//! deterministic tests without a live messaging gateway.
//!
//! # Components
//!
//! - [`MockGateway`] - Gateway client with scripted send results and send capture
//! - [`TestHarness`] - Temp SQLite database, event bus, and seed helpers

pub mod harness;
pub mod mock_gateway;

pub use harness::{TENANT, TestHarness};
pub use mock_gateway::{MockGateway, RecordedSend};
