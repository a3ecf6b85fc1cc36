// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::delivery::DeliveryPolicy;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Parsed and validated relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Config format version. Always "v1".
    pub version: String,
    pub server: ServerConfig,
    pub provider: ProviderSettings,
    pub prompts: PromptConfig,
    pub delivery: DeliveryPolicy,
    pub store: StoreConfig,
    /// SHA256 of the raw YAML: "sha256:{hex}".
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Origins the CORS layer accepts. Empty means same-origin only.
    pub allowed_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Connection settings for the OpenAI-compatible completion API.
#[derive(Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    /// Model for text-only requests.
    pub model: String,
    /// Model for requests that carry images.
    pub vision_model: String,
    /// Whole-request timeout for non-streaming calls.
    pub timeout_ms: Option<u64>,
}

// Hand-written so the key never reaches logs.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PromptConfig {
    /// Directory prompt file names are resolved against.
    pub directory: PathBuf,
    /// Mode used when a request names an unknown mode.
    pub fallback_mode: String,
    pub modes: BTreeMap<String, ModeConfig>,
}

#[derive(Debug, Clone)]
pub struct ModeConfig {
    pub file: PathBuf,
    /// Prompt files selected by the request's `count`.
    pub variants: BTreeMap<u32, PathBuf>,
}

impl PromptConfig {
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.directory.join(file)
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Process-local store; lost on restart.
    Memory,
    Postgrest(PostgrestSettings),
}

/// A PostgREST endpoint (e.g. a Supabase project).
#[derive(Clone)]
pub struct PostgrestSettings {
    pub url: String,
    pub api_key: String,
    pub messages_table: String,
    pub sessions_table: String,
}

impl std::fmt::Debug for PostgrestSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestSettings")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("messages_table", &self.messages_table)
            .field("sessions_table", &self.sessions_table)
            .finish()
    }
}
