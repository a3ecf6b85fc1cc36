// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::delivery::{DeliveryPolicy, DEFAULT_EARLY_BATCH_THRESHOLD, DEFAULT_HEARTBEAT_SECS};
use crate::sections::SectionCatalog;

use super::defaults::*;
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a relay config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source and hash it
/// 2. Parse into raw deserialization types
/// 3. Resolve `${VAR}` references in provider and store credentials
/// 4. Apply defaults and validate ranges
/// 5. Build the typed Config
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.relay != "v1" {
        return Err(ConfigError::invalid(
            "relay",
            format!("unsupported config version \"{}\", expected \"v1\"", raw.relay),
        ));
    }

    let server = build_server_config(raw.server)?;
    let provider = build_provider_settings(raw.provider)?;
    let prompts = build_prompt_config(raw.prompts)?;
    let delivery = build_delivery_policy(raw.delivery, SectionCatalog::standard().len())?;
    let store = build_store_config(raw.store)?;

    Ok(Config {
        version: raw.relay,
        server,
        provider,
        prompts,
        delivery,
        store,
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

fn build_server_config(raw: Option<raw::RawServerConfig>) -> Result<ServerConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(ServerConfig {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            allowed_origins: default_allowed_origins(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        });
    };

    let host = match raw.host {
        Some(h) => h
            .parse()
            .map_err(|e| ConfigError::invalid("server.host", format!("\"{h}\": {e}")))?,
        None => DEFAULT_HOST,
    };

    let body_limit_bytes = raw.body_limit_bytes.unwrap_or(DEFAULT_BODY_LIMIT_BYTES);
    if body_limit_bytes == 0 {
        return Err(ConfigError::invalid("server.body_limit_bytes", "must be > 0"));
    }

    Ok(ServerConfig {
        host,
        port: raw.port.unwrap_or(DEFAULT_PORT),
        allowed_origins: raw.allowed_origins.unwrap_or_else(default_allowed_origins),
        body_limit_bytes,
    })
}

fn build_provider_settings(raw: raw::RawProviderConfig) -> Result<ProviderSettings, ConfigError> {
    let base_url = match raw.base_url {
        Some(url) => resolve_variables("provider.base_url", &url)?,
        None => DEFAULT_BASE_URL.to_string(),
    };
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::invalid(
            "provider.base_url",
            format!("\"{base_url}\" is not an http(s) URL"),
        ));
    }

    let api_key = match raw.api_key {
        Some(key) => resolve_variables("provider.api_key", &key)?,
        None => String::new(),
    };

    if raw.timeout_ms == Some(0) {
        return Err(ConfigError::invalid("provider.timeout_ms", "must be > 0"));
    }

    Ok(ProviderSettings {
        base_url,
        api_key,
        model: raw.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        vision_model: raw
            .vision_model
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
        timeout_ms: raw.timeout_ms,
    })
}

fn build_prompt_config(raw: raw::RawPromptConfig) -> Result<PromptConfig, ConfigError> {
    if raw.modes.is_empty() {
        return Err(ConfigError::invalid("prompts.modes", "at least one mode is required"));
    }
    if !raw.modes.contains_key(&raw.fallback_mode) {
        return Err(ConfigError::invalid(
            "prompts.fallback_mode",
            format!("\"{}\" is not a configured mode", raw.fallback_mode),
        ));
    }

    let mut modes = BTreeMap::new();
    for (name, mode) in raw.modes {
        if mode.file.trim().is_empty() {
            return Err(ConfigError::invalid(
                "prompts.modes",
                format!("mode \"{name}\" has an empty file"),
            ));
        }
        let mut variants = BTreeMap::new();
        for (key, file) in mode.variants {
            let count = parse_count_key(&key).ok_or_else(|| {
                ConfigError::invalid(
                    "prompts.modes",
                    format!("mode \"{name}\": variant key {key:?} must be a positive integer"),
                )
            })?;
            variants.insert(count, PathBuf::from(file));
        }
        modes.insert(
            name,
            ModeConfig {
                file: PathBuf::from(mode.file),
                variants,
            },
        );
    }

    Ok(PromptConfig {
        directory: PathBuf::from(
            raw.directory
                .unwrap_or_else(|| DEFAULT_PROMPT_DIRECTORY.to_string()),
        ),
        fallback_mode: raw.fallback_mode,
        modes,
    })
}

fn parse_count_key(key: &raw::RawCountKey) -> Option<u32> {
    let count = match key {
        raw::RawCountKey::Number(n) => u32::try_from(*n).ok()?,
        raw::RawCountKey::Text(s) => s.trim().parse().ok()?,
    };
    (count >= 1).then_some(count)
}

fn build_delivery_policy(
    raw: Option<raw::RawDeliveryConfig>,
    catalog_len: usize,
) -> Result<DeliveryPolicy, ConfigError> {
    let (threshold, heartbeat_secs) = match raw {
        Some(d) => (
            d.early_batch_threshold.unwrap_or(DEFAULT_EARLY_BATCH_THRESHOLD),
            d.heartbeat_secs.unwrap_or(DEFAULT_HEARTBEAT_SECS),
        ),
        None => (DEFAULT_EARLY_BATCH_THRESHOLD, DEFAULT_HEARTBEAT_SECS),
    };

    if threshold == 0 || threshold > catalog_len {
        return Err(ConfigError::invalid(
            "delivery.early_batch_threshold",
            format!("{threshold} is outside 1..={catalog_len}"),
        ));
    }
    if heartbeat_secs == 0 {
        return Err(ConfigError::invalid("delivery.heartbeat_secs", "must be >= 1"));
    }

    Ok(DeliveryPolicy {
        early_batch_threshold: threshold,
        heartbeat_interval: Duration::from_secs(heartbeat_secs),
    })
}

fn build_store_config(raw: Option<raw::RawStoreConfig>) -> Result<StoreConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(StoreConfig::Memory);
    };

    match raw.kind.as_str() {
        "memory" => Ok(StoreConfig::Memory),
        "postgrest" => {
            let url = raw
                .url
                .ok_or_else(|| ConfigError::invalid("store.url", "required for postgrest store"))?;
            let api_key = raw.api_key.ok_or_else(|| {
                ConfigError::invalid("store.api_key", "required for postgrest store")
            })?;
            Ok(StoreConfig::Postgrest(PostgrestSettings {
                url: resolve_variables("store.url", &url)?,
                api_key: resolve_variables("store.api_key", &api_key)?,
                messages_table: raw
                    .messages_table
                    .unwrap_or_else(|| DEFAULT_MESSAGES_TABLE.to_string()),
                sessions_table: raw
                    .sessions_table
                    .unwrap_or_else(|| DEFAULT_SESSIONS_TABLE.to_string()),
            }))
        }
        other => Err(ConfigError::invalid(
            "store.kind",
            format!("unknown store kind \"{other}\", expected \"memory\" or \"postgrest\""),
        )),
    }
}
