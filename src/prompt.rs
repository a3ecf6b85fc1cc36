// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// System prompt library
//
// Prompt files are read once at startup. A request's mode picks the prompt
// (unknown modes use the fallback mode) and an optional count picks a
// per-mode variant when one is configured for exactly that count.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::PromptConfig;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("failed to read prompt {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("prompt {} is empty", path.display())]
    Empty { path: PathBuf },

    #[error("fallback mode \"{0}\" has no prompt")]
    MissingFallback(String),
}

#[derive(Debug, Clone)]
struct ModePrompts {
    base: String,
    variants: BTreeMap<u32, String>,
}

#[derive(Debug, Clone)]
pub struct PromptLibrary {
    fallback_mode: String,
    modes: BTreeMap<String, ModePrompts>,
}

impl PromptLibrary {
    /// Read every configured prompt file.
    pub fn load(config: &PromptConfig) -> Result<Self, PromptError> {
        let mut modes = BTreeMap::new();
        for (name, mode) in &config.modes {
            let base = read_prompt(config.resolve(&mode.file))?;
            let mut variants = BTreeMap::new();
            for (count, file) in &mode.variants {
                variants.insert(*count, read_prompt(config.resolve(file))?);
            }
            tracing::debug!(mode = %name, variants = variants.len(), "prompt loaded");
            modes.insert(name.clone(), ModePrompts { base, variants });
        }
        Self::build(config.fallback_mode.clone(), modes)
    }

    /// Build a library from in-memory prompt text keyed by mode.
    pub fn from_templates<I, K, V>(fallback_mode: &str, templates: I) -> Result<Self, PromptError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let modes = templates
            .into_iter()
            .map(|(k, v)| {
                (
                    k.into(),
                    ModePrompts {
                        base: v.into(),
                        variants: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Self::build(fallback_mode.to_string(), modes)
    }

    /// Add or replace the variant used for `count` in `mode`.
    pub fn with_variant(mut self, mode: &str, count: u32, text: impl Into<String>) -> Self {
        if let Some(prompts) = self.modes.get_mut(mode) {
            prompts.variants.insert(count, text.into());
        }
        self
    }

    fn build(fallback_mode: String, modes: BTreeMap<String, ModePrompts>) -> Result<Self, PromptError> {
        if !modes.contains_key(&fallback_mode) {
            return Err(PromptError::MissingFallback(fallback_mode));
        }
        Ok(Self {
            fallback_mode,
            modes,
        })
    }

    pub fn has_mode(&self, mode: &str) -> bool {
        self.modes.contains_key(mode)
    }

    pub fn fallback_mode(&self) -> &str {
        &self.fallback_mode
    }

    /// The system prompt for a request.
    pub fn system_prompt(&self, mode: &str, count: Option<u32>) -> &str {
        let Some(prompts) = self
            .modes
            .get(mode)
            .or_else(|| self.modes.get(&self.fallback_mode))
        else {
            return "";
        };
        count
            .and_then(|c| prompts.variants.get(&c))
            .unwrap_or(&prompts.base)
    }
}

fn read_prompt(path: PathBuf) -> Result<String, PromptError> {
    let text = std::fs::read_to_string(&path).map_err(|source| PromptError::Io {
        path: path.clone(),
        source,
    })?;
    if text.trim().is_empty() {
        return Err(PromptError::Empty { path });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeConfig;
    use std::fs;

    fn library() -> PromptLibrary {
        PromptLibrary::from_templates(
            "deep_dive",
            [("example", "EXAMPLE PROMPT"), ("deep_dive", "DEEP PROMPT")],
        )
        .unwrap()
        .with_variant("example", 3, "EXAMPLE x3")
    }

    #[test]
    fn selects_prompt_by_mode() {
        let lib = library();
        assert_eq!(lib.system_prompt("example", None), "EXAMPLE PROMPT");
        assert_eq!(lib.system_prompt("deep_dive", None), "DEEP PROMPT");
    }

    #[test]
    fn unknown_mode_uses_fallback() {
        let lib = library();
        assert!(!lib.has_mode("quiz"));
        assert_eq!(lib.system_prompt("quiz", None), "DEEP PROMPT");
    }

    #[test]
    fn count_selects_exact_variant_only() {
        let lib = library();
        assert_eq!(lib.system_prompt("example", Some(3)), "EXAMPLE x3");
        assert_eq!(lib.system_prompt("example", Some(4)), "EXAMPLE PROMPT");
        assert_eq!(lib.system_prompt("deep_dive", Some(3)), "DEEP PROMPT");
    }

    #[test]
    fn missing_fallback_is_rejected() {
        let err = PromptLibrary::from_templates("absent", [("example", "x")]).unwrap_err();
        assert!(matches!(err, PromptError::MissingFallback(ref m) if m == "absent"));
    }

    fn config(dir: &std::path::Path) -> PromptConfig {
        let mut modes = BTreeMap::new();
        modes.insert(
            "example".to_string(),
            ModeConfig {
                file: PathBuf::from("ExampleLearnPrompt.txt"),
                variants: BTreeMap::from([(2, PathBuf::from("ExampleLearnPrompt2.txt"))]),
            },
        );
        PromptConfig {
            directory: dir.to_path_buf(),
            fallback_mode: "example".into(),
            modes,
        }
    }

    #[test]
    fn loads_files_relative_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ExampleLearnPrompt.txt"), "base prompt").unwrap();
        fs::write(dir.path().join("ExampleLearnPrompt2.txt"), "two examples").unwrap();

        let lib = PromptLibrary::load(&config(dir.path())).unwrap();
        assert_eq!(lib.system_prompt("example", None), "base prompt");
        assert_eq!(lib.system_prompt("example", Some(2)), "two examples");
    }

    #[test]
    fn missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ExampleLearnPrompt.txt"), "base prompt").unwrap();

        let err = PromptLibrary::load(&config(dir.path())).unwrap_err();
        assert!(err.to_string().contains("ExampleLearnPrompt2.txt"));
    }

    #[test]
    fn blank_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ExampleLearnPrompt.txt"), "  \n").unwrap();
        fs::write(dir.path().join("ExampleLearnPrompt2.txt"), "two").unwrap();

        assert!(matches!(
            PromptLibrary::load(&config(dir.path())),
            Err(PromptError::Empty { .. })
        ));
    }
}
