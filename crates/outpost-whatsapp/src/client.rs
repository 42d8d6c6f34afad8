// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Evolution-style WhatsApp gateway API.
//!
//! Provides [`EvolutionClient`], which resolves each channel's endpoint
//! (per-channel URL, key, and instance with global fallbacks), builds the
//! kind-specific request body, and maps HTTP outcomes onto [`GatewayError`].

use std::time::Duration;

use async_trait::async_trait;
use outpost_config::WhatsAppConfig;
use outpost_core::{
    Channel, GatewayClient, GatewayError, MessageKind, OutboundPayload, OutpostError, SendReceipt,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::recipient::normalize_recipient;

/// Gateway client holding the global fallbacks and a pooled HTTP client.
#[derive(Debug, Clone)]
pub struct EvolutionClient {
    client: reqwest::Client,
    default_base_url: Option<String>,
    default_api_key: Option<String>,
}

/// Everything needed to address one channel's instance.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    base_url: String,
    api_key: String,
    instance: String,
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct MediaRequest<'a> {
    number: &'a str,
    mediatype: &'a str,
    media: &'a str,
    caption: &'a str,
    #[serde(rename = "fileName", skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AudioRequest<'a> {
    number: &'a str,
    audio: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    key: Option<ResponseKey>,
}

#[derive(Debug, Deserialize)]
struct ResponseKey {
    #[serde(default)]
    id: Option<String>,
}

impl EvolutionClient {
    /// Creates a client from the `[whatsapp]` config section.
    pub fn new(config: &WhatsAppConfig) -> Result<Self, OutpostError> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OutpostError::Gateway {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            default_base_url: non_blank(config.base_url.as_deref()),
            default_api_key: non_blank(config.api_key.as_deref()),
        })
    }

    fn endpoint(&self, channel: &Channel) -> Result<Endpoint, GatewayError> {
        let base_url = non_blank(channel.base_url.as_deref())
            .or_else(|| self.default_base_url.clone())
            .ok_or_else(|| {
                GatewayError::Configuration(format!("channel {} has no gateway base URL", channel.id))
            })?;
        let api_key = non_blank(channel.api_key.as_deref())
            .or_else(|| self.default_api_key.clone())
            .ok_or_else(|| {
                GatewayError::Configuration(format!("channel {} has no gateway API key", channel.id))
            })?;
        let instance = non_blank(channel.instance_name.as_deref()).ok_or_else(|| {
            GatewayError::Configuration(format!("channel {} has no instance name", channel.id))
        })?;

        Ok(Endpoint {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            instance,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &Endpoint,
        action: &str,
        body: &B,
    ) -> Result<SendReceipt, GatewayError> {
        let url = format!(
            "{}/message/{action}/{}",
            endpoint.base_url, endpoint.instance
        );
        let api_key = HeaderValue::from_str(&endpoint.api_key)
            .map_err(|e| GatewayError::Configuration(format!("invalid API key header value: {e}")))?;

        let response = self
            .client
            .post(&url)
            .header("apikey", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        debug!(status = %status, action, instance = %endpoint.instance, "gateway response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, action, "gateway rejected send");
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(SendReceipt::default());
        }

        let parsed: SendResponse =
            serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(SendReceipt {
            provider_message_id: parsed.key.and_then(|k| k.id),
        })
    }
}

#[async_trait]
impl GatewayClient for EvolutionClient {
    fn name(&self) -> &str {
        "evolution"
    }

    fn check_channel(&self, channel: &Channel) -> Result<(), GatewayError> {
        self.endpoint(channel).map(|_| ())
    }

    async fn send(
        &self,
        channel: &Channel,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, GatewayError> {
        let endpoint = self.endpoint(channel)?;
        let number = normalize_recipient(&payload.recipient)?;
        let content = payload.content.as_deref().unwrap_or_default();

        match payload.kind {
            MessageKind::Text => {
                if content.trim().is_empty() {
                    return Err(GatewayError::InvalidPayload(
                        "text message without content".into(),
                    ));
                }
                let body = TextRequest {
                    number: &number,
                    text: content,
                };
                self.post(&endpoint, "sendText", &body).await
            }
            MessageKind::Image | MessageKind::Video | MessageKind::Document => {
                let media = require_media(payload)?;
                let mediatype = match payload.kind {
                    MessageKind::Image => "image",
                    MessageKind::Video => "video",
                    _ => "document",
                };
                let body = MediaRequest {
                    number: &number,
                    mediatype,
                    media,
                    caption: content,
                    file_name: payload.file_name.as_deref(),
                };
                self.post(&endpoint, "sendMedia", &body).await
            }
            MessageKind::Audio => {
                let body = AudioRequest {
                    number: &number,
                    audio: require_media(payload)?,
                };
                self.post(&endpoint, "sendWhatsAppAudio", &body).await
            }
            other => Err(GatewayError::UnsupportedKind(other.to_string())),
        }
    }
}

fn require_media(payload: &OutboundPayload) -> Result<&str, GatewayError> {
    payload
        .media_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| GatewayError::InvalidPayload(format!("{} without media_url", payload.kind)))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
