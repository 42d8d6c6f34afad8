// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed model of the gateway's webhook callbacks.
//!
//! Each stored event is parsed once into an [`IngestEvent`]: one variant per
//! recognized kind with its own payload type, plus [`IngestEvent::Unknown`]
//! for kinds we do not handle. Payload structs only declare the fields we
//! read; everything else in the provider JSON is ignored.

use outpost_core::{ChannelStatus, MessageKind, MessageStatus};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// A parsed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// New or echoed messages (`messages.upsert`, `send.message`).
    MessageUpsert(Vec<MessageData>),
    /// Delivery receipts (`messages.update`).
    MessageStatus(Vec<StatusData>),
    /// Instance connection changes (`connection.update`).
    ConnectionState(ConnectionData),
    /// Contact profile changes (`contacts.upsert`, `contacts.update`).
    ContactUpsert(Vec<ContactData>),
    /// Any other kind; processed as a no-op.
    Unknown(String),
}

impl IngestEvent {
    /// Parse a stored payload according to its event kind.
    pub fn parse(kind: &str, payload: &str) -> Result<Self, serde_json::Error> {
        let kind = normalize_kind(kind);
        let data = || -> Result<serde_json::Value, serde_json::Error> {
            Ok(serde_json::from_str::<Envelope>(payload)?.data)
        };

        Ok(match kind.as_str() {
            "messages.upsert" | "send.message" => IngestEvent::MessageUpsert(many(data()?)?),
            "messages.update" => IngestEvent::MessageStatus(many(data()?)?),
            "connection.update" => IngestEvent::ConnectionState(serde_json::from_value(data()?)?),
            "contacts.upsert" | "contacts.update" => IngestEvent::ContactUpsert(many(data()?)?),
            _ => IngestEvent::Unknown(kind),
        })
    }
}

/// Canonical spelling of an event kind: `MESSAGES_UPSERT` -> `messages.upsert`.
pub fn normalize_kind(kind: &str) -> String {
    kind.trim().to_ascii_lowercase().replace('_', ".")
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: serde_json::Value,
}

/// Providers send either a single object or an array under `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn many<T: DeserializeOwned>(data: serde_json::Value) -> Result<Vec<T>, serde_json::Error> {
    Ok(match serde_json::from_value(data)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

/// Seconds since the epoch, sent as a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UnixSeconds {
    Number(i64),
    Text(String),
}

impl UnixSeconds {
    pub fn as_secs(&self) -> Option<i64> {
        match self {
            UnixSeconds::Number(n) => Some(*n),
            UnixSeconds::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// A message inside an upsert event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub key: MessageKey,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default)]
    pub message_timestamp: Option<UnixSeconds>,
    /// Plain text some gateway versions put next to the envelope.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: Option<String>,
}

/// The provider's polymorphic message envelope. At most one field is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<ExtendedText>,
    #[serde(default)]
    pub image_message: Option<Media>,
    #[serde(default)]
    pub video_message: Option<Media>,
    #[serde(default)]
    pub audio_message: Option<Media>,
    #[serde(default)]
    pub document_message: Option<Media>,
    #[serde(default)]
    pub sticker_message: Option<Media>,
    #[serde(default)]
    pub location_message: Option<Location>,
    #[serde(default)]
    pub contact_message: Option<ContactCard>,
    #[serde(default)]
    pub reaction_message: Option<Reaction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub degrees_latitude: f64,
    pub degrees_longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCard {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub text: Option<String>,
}

/// Normalized content of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
}

impl MessageData {
    /// Reduce the envelope to a `(kind, content, media)` triple.
    ///
    /// Unrecognized envelopes fall back to `body` as text, and to empty text
    /// when there is no body either.
    pub fn extract(&self) -> Extracted {
        let fallback = || Extracted {
            kind: MessageKind::Text,
            content: self.body.clone(),
            media_url: None,
        };
        let Some(m) = &self.message else {
            return fallback();
        };

        let media = |kind: MessageKind, media: &Media, content: Option<String>| Extracted {
            kind,
            content,
            media_url: media.url.clone(),
        };

        if let Some(text) = &m.conversation {
            return Extracted {
                kind: MessageKind::Text,
                content: Some(text.clone()),
                media_url: None,
            };
        }
        if let Some(ext) = &m.extended_text_message {
            return Extracted {
                kind: MessageKind::Text,
                content: ext.text.clone(),
                media_url: None,
            };
        }
        if let Some(img) = &m.image_message {
            return media(MessageKind::Image, img, img.caption.clone());
        }
        if let Some(video) = &m.video_message {
            return media(MessageKind::Video, video, video.caption.clone());
        }
        if let Some(audio) = &m.audio_message {
            return media(MessageKind::Audio, audio, None);
        }
        if let Some(doc) = &m.document_message {
            return media(
                MessageKind::Document,
                doc,
                doc.caption.clone().or_else(|| doc.file_name.clone()),
            );
        }
        if let Some(sticker) = &m.sticker_message {
            return media(MessageKind::Sticker, sticker, None);
        }
        if let Some(loc) = &m.location_message {
            return Extracted {
                kind: MessageKind::Location,
                content: Some(format!("{},{}", loc.degrees_latitude, loc.degrees_longitude)),
                media_url: None,
            };
        }
        if let Some(card) = &m.contact_message {
            return Extracted {
                kind: MessageKind::Contact,
                content: card.display_name.clone(),
                media_url: None,
            };
        }
        if let Some(reaction) = &m.reaction_message {
            return Extracted {
                kind: MessageKind::Reaction,
                content: reaction.text.clone(),
                media_url: None,
            };
        }
        fallback()
    }
}

/// A status code sent as a number or a symbolic name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StatusCode {
    Number(i64),
    Text(String),
}

impl StatusCode {
    /// Map to a delivery status. Unknown codes yield `None`.
    pub fn to_status(&self) -> Option<MessageStatus> {
        match self {
            StatusCode::Number(1) => Some(MessageStatus::Pending),
            StatusCode::Number(2) => Some(MessageStatus::Sent),
            StatusCode::Number(3) => Some(MessageStatus::Delivered),
            StatusCode::Number(4 | 5) => Some(MessageStatus::Read),
            StatusCode::Number(_) => None,
            StatusCode::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "PENDING" => Some(MessageStatus::Pending),
                "SERVER_ACK" => Some(MessageStatus::Sent),
                "DELIVERY_ACK" => Some(MessageStatus::Delivered),
                "READ" | "PLAYED" => Some(MessageStatus::Read),
                other => other.parse::<i64>().ok().and_then(|n| StatusCode::Number(n).to_status()),
            },
        }
    }
}

/// One entry of a `messages.update` event.
///
/// Older gateways nest the ID and status (`key.id`, `update.status`); newer
/// ones flatten them (`keyId`, `status`). Both are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    #[serde(default)]
    pub key: Option<StatusKey>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub status: Option<StatusCode>,
    #[serde(default)]
    pub update: Option<StatusUpdate>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusKey {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<StatusCode>,
}

impl StatusData {
    pub fn provider_message_id(&self) -> Option<&str> {
        self.key
            .as_ref()
            .and_then(|k| k.id.as_deref())
            .or(self.key_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn status(&self) -> Option<MessageStatus> {
        self.status
            .as_ref()
            .or_else(|| self.update.as_ref().and_then(|u| u.status.as_ref()))
            .and_then(StatusCode::to_status)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionData {
    #[serde(default)]
    pub state: Option<String>,
}

impl ConnectionData {
    /// Map the provider state. Anything unrecognized reads as disconnected.
    pub fn channel_status(&self) -> ChannelStatus {
        match self.state.as_deref().map(str::trim) {
            Some("open") => ChannelStatus::Connected,
            Some("connecting") => ChannelStatus::Connecting,
            Some("refused") => ChannelStatus::Error,
            _ => ChannelStatus::Disconnected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactData {
    #[serde(default, alias = "id")]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

/// Status updates, channel announcements, and newsletters are not conversations.
pub fn is_broadcast(jid: &str) -> bool {
    jid.ends_with("@broadcast") || jid.ends_with("@newsletter")
}
