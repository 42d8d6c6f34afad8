// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging gateway client trait.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::types::{Channel, OutboundPayload, SendReceipt};

/// Client for the third-party messaging HTTP API.
///
/// Implementations hold no per-send state. A single call is one attempt;
/// retries are the dispatcher's job.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Verify the channel has everything needed to send, without network I/O.
    ///
    /// Returns [`GatewayError::Configuration`] when the endpoint cannot be resolved.
    fn check_channel(&self, channel: &Channel) -> Result<(), GatewayError>;

    /// Send one message through the channel.
    async fn send(
        &self,
        channel: &Channel,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, GatewayError>;
}
