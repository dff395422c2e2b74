//! Optional REPL configuration, read from `~/.config/monkey/config.toml`.
//!
//! Mirrors the teacher's use of `dirs` to locate a per-user config/history
//! directory; a missing file or missing fields fall back to defaults rather
//! than failing the session.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_PROMPT: &str = ">> ";
const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    pub prompt: String,
    pub history_file: Option<PathBuf>,
    pub history_limit: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            prompt: DEFAULT_PROMPT.to_string(),
            history_file: default_history_file(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn default_history_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("monkey").join("history"))
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("monkey").join("config.toml"))
}

impl ReplConfig {
    /// Load from `~/.config/monkey/config.toml`, falling back to defaults
    /// if the file is absent, unreadable, or fails to parse.
    pub fn load() -> ReplConfig {
        let Some(path) = config_path() else {
            return ReplConfig::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
                ReplConfig::default()
            }),
            Err(_) => ReplConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ReplConfig = toml::from_str("prompt = \"monkey> \"").unwrap();
        assert_eq!(config.prompt, "monkey> ");
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn empty_document_yields_full_defaults() {
        let config: ReplConfig = toml::from_str("").unwrap();
        assert_eq!(config.prompt, DEFAULT_PROMPT);
    }
}
