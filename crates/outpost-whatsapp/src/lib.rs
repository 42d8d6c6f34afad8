// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp gateway adapter for the Outpost message pipeline.
//!
//! Implements [`outpost_core::GatewayClient`] for an Evolution-style HTTP
//! API: one POST per message, kind-specific endpoints, `apikey` header
//! authentication with per-channel keys falling back to a global default.

pub mod client;
pub mod recipient;

pub use client::EvolutionClient;
pub use recipient::normalize_recipient;
