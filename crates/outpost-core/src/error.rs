// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Outpost message pipeline.

use thiserror::Error;

/// The primary error type used across Outpost crates.
#[derive(Debug, Error)]
pub enum OutpostError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging gateway errors surfaced outside the per-item retry path.
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before reaching storage.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure of a single gateway send.
///
/// The dispatcher only consults [`GatewayError::is_retryable`]; everything
/// else is carried into the item's `last_error` for operators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Channel endpoint cannot be resolved (missing base URL, key, or instance).
    #[error("channel configuration error: {0}")]
    Configuration(String),

    /// Recipient address has no usable canonical form.
    #[error("invalid recipient `{0}`")]
    InvalidRecipient(String),

    /// Message kind cannot be sent through the gateway.
    #[error("unsupported message kind `{0}`")]
    UnsupportedKind(String),

    /// Payload is missing content the endpoint requires.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Gateway answered with a non-2xx status.
    #[error("gateway returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Network failure before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded the client timeout.
    #[error("gateway request timed out")]
    Timeout,

    /// 2xx response whose body could not be decoded.
    #[error("failed to decode gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether a later dispatch cycle may succeed with the same item.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Http { .. }
                | GatewayError::Transport(_)
                | GatewayError::Timeout
                | GatewayError::Decode(_)
        )
    }
}
