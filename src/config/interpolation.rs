// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Resolve `${VAR}` and `${VAR:-fallback}` references from the environment.
///
/// A variable that is unset (or set to the empty string) uses its fallback
/// when one is given; otherwise it is an error naming `field`. Malformed
/// references (no closing brace, empty name) are kept literally.
pub fn resolve_variables(field: &'static str, input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        result.push_str(&rest[..open]);
        let after = &rest[open + 2..];

        let Some(close) = after.find('}') else {
            result.push_str(&rest[open..]);
            return Ok(result);
        };

        let reference = &after[..close];
        let (name, fallback) = match reference.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (reference, None),
        };

        if name.is_empty() {
            result.push_str(&rest[open..open + 2 + close + 1]);
        } else {
            match (std::env::var(name).ok().filter(|v| !v.is_empty()), fallback) {
                (Some(value), _) => result.push_str(&value),
                (None, Some(fallback)) => result.push_str(fallback),
                (None, None) => {
                    return Err(ConfigError::UndefinedVariable {
                        field,
                        name: name.to_string(),
                    })
                }
            }
        }

        rest = &after[close + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
