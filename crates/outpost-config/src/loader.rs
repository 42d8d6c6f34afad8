// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./outpost.toml` > `~/.config/outpost/outpost.toml` > `/etc/outpost/outpost.toml`
//! with environment variable overrides via `OUTPOST_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::OutpostConfig;

/// Top-level sections, used to split `OUTPOST_<SECTION>_<KEY>` env vars.
const SECTIONS: &[&str] = &[
    "service", "storage", "server", "whatsapp", "dispatch", "ingest", "followup", "events",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/outpost/outpost.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "outpost.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("outpost/outpost.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/outpost/outpost.toml` (system-wide)
/// 3. `~/.config/outpost/outpost.toml` (user XDG config)
/// 4. `./outpost.toml` (local directory)
/// 5. `OUTPOST_*` environment variables
pub fn load_config() -> Result<OutpostConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<OutpostConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OutpostConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<OutpostConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OutpostConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(OutpostConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config key.
///
/// Only the first underscore after a known section is turned into a dot, so
/// `dispatch_max_channels` becomes `dispatch.max_channels`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("OUTPOST_").map(|key| map_env_key(key.as_str()).into())
}
