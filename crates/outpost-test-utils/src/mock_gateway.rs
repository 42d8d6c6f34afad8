// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock gateway client for deterministic dispatch tests.
//!
//! `MockGateway` implements `GatewayClient` with a FIFO queue of scripted
//! outcomes and records every send it receives.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use outpost_core::{Channel, GatewayClient, GatewayError, OutboundPayload, SendReceipt};

/// One send observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub channel_id: String,
    pub payload: OutboundPayload,
}

/// A gateway that returns scripted results.
///
/// Results are popped from a queue. When the queue is empty every send
/// succeeds with a generated provider message ID (`mock-1`, `mock-2`, ...).
#[derive(Default)]
pub struct MockGateway {
    results: Mutex<VecDeque<Result<SendReceipt, GatewayError>>>,
    sends: Mutex<Vec<RecordedSend>>,
    misconfigured: HashSet<String>,
    counter: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `check_channel` for this channel ID.
    pub fn with_misconfigured(mut self, channel_id: &str) -> Self {
        self.misconfigured.insert(channel_id.to_string());
        self
    }

    /// Queue the outcome of the next send.
    pub async fn push_result(&self, result: Result<SendReceipt, GatewayError>) {
        self.results.lock().await.push_back(result);
    }

    /// Queue `n` HTTP 500 failures.
    pub async fn push_server_errors(&self, n: usize) {
        let mut results = self.results.lock().await;
        for _ in 0..n {
            results.push_back(Err(GatewayError::Http {
                status: 500,
                body: "internal server error".into(),
            }));
        }
    }

    /// Every send received so far, in call order.
    pub async fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.sends.lock().await.len()
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    fn name(&self) -> &str {
        "mock-gateway"
    }

    fn check_channel(&self, channel: &Channel) -> Result<(), GatewayError> {
        if self.misconfigured.contains(&channel.id) {
            return Err(GatewayError::Configuration(format!(
                "channel {} has no gateway API key",
                channel.id
            )));
        }
        Ok(())
    }

    async fn send(
        &self,
        channel: &Channel,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, GatewayError> {
        self.sends.lock().await.push(RecordedSend {
            channel_id: channel.id.clone(),
            payload: payload.clone(),
        });
        match self.results.lock().await.pop_front() {
            Some(result) => result,
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(SendReceipt {
                    provider_message_id: Some(format!("mock-{n}")),
                })
            }
        }
    }
}
