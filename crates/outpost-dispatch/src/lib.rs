// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox dispatch for the Outpost message pipeline.
//!
//! A dispatch cycle:
//!
//! 1. returns items stuck in `sending` past `stale_sending_minutes` to `pending`,
//! 2. picks a random subset of connected channels (at most `max_channels`),
//! 3. takes each channel's lease through [`ChannelLockManager`], skipping
//!    channels leased elsewhere,
//! 4. claims each ready item with a `pending -> sending` compare-and-swap and
//!    hands it to the [`GatewayClient`](outpost_core::GatewayClient),
//! 5. records the outcome (`sent`, requeued with backoff, or `failed`) and
//!    releases the lease.
//!
//! # Delivery guarantee
//!
//! Delivery is at-least-once. The gateway call and the `sent` update are not
//! atomic: if the process dies after the gateway accepted a message but before
//! the item is marked `sent`, the item stays in `sending`, the stale sweep puts
//! it back to `pending`, and the next cycle sends it again. Duplicates are
//! absorbed on the read side by provider message ID deduplication.

pub mod dispatcher;
pub mod locks;

pub use dispatcher::{DispatchSummary, Dispatcher, backoff_delay, shuffle_and_cap};
pub use locks::ChannelLockManager;
