// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::net::{IpAddr, Ipv4Addr};

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 3001;

/// Data-URI images make request bodies large.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 15 * 1024 * 1024;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4.1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_PROMPT_DIRECTORY: &str = "prompts";

pub const DEFAULT_MESSAGES_TABLE: &str = "chat_history";
pub const DEFAULT_SESSIONS_TABLE: &str = "chat_sessions";

pub fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
