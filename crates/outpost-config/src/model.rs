// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Outpost pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Outpost configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutpostConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP trigger server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Messaging gateway defaults.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Outbox dispatch cycle settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Webhook ingest cycle settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Follow-up scheduler and reconciler settings.
    #[serde(default)]
    pub followup: FollowupConfig,

    /// Observability event bus settings.
    #[serde(default)]
    pub events: EventsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and the health endpoint.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "outpost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "outpost.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP trigger server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on trigger endpoints. `None` rejects all API calls.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8470
}

/// Messaging gateway defaults.
///
/// Channels without their own base URL or API key fall back to these.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Default gateway base URL (e.g. `http://127.0.0.1:8080`).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Default gateway API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Outbox dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Maximum channels processed per dispatch cycle.
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,

    /// Maximum items claimed per channel per cycle.
    #[serde(default = "default_items_per_channel")]
    pub items_per_channel: usize,

    /// Retry ceiling stamped on newly enqueued outbox items.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay before a failed item becomes ready again.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Upper bound for the exponential retry delay.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Items left in `sending` longer than this are returned to `pending`.
    #[serde(default = "default_stale_sending_minutes")]
    pub stale_sending_minutes: i64,

    /// Channel lease lifetime; an expired lease can be taken over.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_channels: default_max_channels(),
            items_per_channel: default_items_per_channel(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            stale_sending_minutes: default_stale_sending_minutes(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

fn default_max_channels() -> usize {
    10
}

fn default_items_per_channel() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    30
}

fn default_max_backoff_secs() -> u64 {
    1800
}

fn default_stale_sending_minutes() -> i64 {
    10
}

fn default_lock_ttl_secs() -> u64 {
    300
}

/// Webhook ingest configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Maximum events processed per ingest cycle.
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,

    /// Events failing this many times are left unprocessed for inspection.
    #[serde(default = "default_ingest_max_retries")]
    pub max_retries: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_ingest_batch_size(),
            max_retries: default_ingest_max_retries(),
        }
    }
}

fn default_ingest_batch_size() -> usize {
    100
}

fn default_ingest_max_retries() -> u32 {
    5
}

/// Which task timestamp newer activity is compared against when reconciling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAnchor {
    /// Task creation time.
    #[default]
    CreatedAt,
    /// Auto-send time, falling back to scheduled and creation time.
    SentAt,
}

/// Follow-up scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FollowupConfig {
    /// Timestamp used to decide whether activity is newer than a task.
    #[serde(default)]
    pub reconcile_anchor: ReconcileAnchor,

    /// Start a dispatch cycle after a follow-up cycle auto-sends messages.
    #[serde(default = "default_trigger_dispatch")]
    pub trigger_dispatch: bool,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            reconcile_anchor: ReconcileAnchor::default(),
            trigger_dispatch: default_trigger_dispatch(),
        }
    }
}

fn default_trigger_dispatch() -> bool {
    true
}

/// Observability event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Bounded channel capacity; events beyond it are dropped.
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

fn default_events_capacity() -> usize {
    1024
}
