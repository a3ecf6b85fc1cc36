// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the typed Config because interpolation, defaults and
// validation all happen between the two.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub relay: String,
    pub server: Option<RawServerConfig>,
    #[serde(default)]
    pub provider: RawProviderConfig,
    pub prompts: RawPromptConfig,
    pub delivery: Option<RawDeliveryConfig>,
    pub store: Option<RawStoreConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub allowed_origins: Option<Vec<String>>,
    pub body_limit_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProviderConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub vision_model: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawPromptConfig {
    pub directory: Option<String>,
    pub fallback_mode: String,
    pub modes: BTreeMap<String, RawModeConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RawModeConfig {
    pub file: String,
    #[serde(default)]
    pub variants: BTreeMap<RawCountKey, String>,
}

/// Variant key; YAML may write it as `3` or `"3"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(untagged)]
pub enum RawCountKey {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct RawDeliveryConfig {
    pub early_batch_threshold: Option<usize>,
    pub heartbeat_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawStoreConfig {
    pub kind: String,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub messages_table: Option<String>,
    pub sessions_table: Option<String>,
}
