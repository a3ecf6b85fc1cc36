// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use super::error::ConfigError;

/// Where relay YAML comes from.
///
/// `FileSource` reads `relay.yaml` (or the `--config` path) from disk;
/// `StringSource` hands content over directly so tests skip file I/O.
pub trait ConfigSource {
    fn load(&self) -> Result<String, ConfigError>;

    /// Label used in startup logs.
    fn describe(&self) -> String;
}

pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct StringSource {
    pub content: String,
}

impl From<&str> for StringSource {
    fn from(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

impl ConfigSource for StringSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }

    fn describe(&self) -> String {
        "<inline>".to_string()
    }
}
