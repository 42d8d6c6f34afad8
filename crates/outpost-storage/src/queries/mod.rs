// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod channels;
pub mod conversations;
pub mod followups;
pub mod locks;
pub mod members;
pub mod messages;
pub mod outbox;
pub mod webhook_events;
