//! Configuration loading.
//!
//! Configuration lives in `~/.config/agent-handoff/config.toml` and is purely
//! optional. When the file is absent, or present but unparsable, every option
//! falls back to its default — this crate is zero-config by design, so a
//! broken or missing config file is never an error.
//!
//! CLI flags always override config values, and config values always
//! override the built-in default; `main.rs` is responsible for applying that
//! precedence, not this module.

use std::path::PathBuf;

use serde::Deserialize;

use crate::model::Source;

/// Per-source storage path overrides from the `[sources]` table, keyed by
/// source name (`claude-code`, `cursor`, `codex`, `copilot`, `gemini`,
/// `opencode`, `droid`).
#[derive(Debug, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(rename = "claude-code")]
    pub claude_code: Option<String>,
    pub cursor: Option<String>,
    pub codex: Option<String>,
    pub copilot: Option<String>,
    pub gemini: Option<String>,
    pub opencode: Option<String>,
    pub droid: Option<String>,
}

impl SourcesConfig {
    fn get(&self, source: Source) -> Option<&str> {
        match source {
            Source::ClaudeCode => self.claude_code.as_deref(),
            Source::Cursor => self.cursor.as_deref(),
            Source::Codex => self.codex.as_deref(),
            Source::Copilot => self.copilot.as_deref(),
            Source::Gemini => self.gemini.as_deref(),
            Source::Opencode => self.opencode.as_deref(),
            Source::Droid => self.droid.as_deref(),
        }
    }

    /// Resolve the configured storage path for `source`, expanding `~`.
    pub fn path_for(&self, source: Source) -> Option<PathBuf> {
        self.get(source).map(expand_tilde)
    }
}

/// Top-level config deserialized from `~/.config/agent-handoff/config.toml`.
/// All fields are optional, so a config file with a single key is valid.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Default output directory for `.handoff/session.json` / `RESUME.md`.
    pub output: Option<String>,
    /// Default target agent hint used when `--target` isn't passed.
    pub target: Option<String>,
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Config {
    /// Load config from `~/.config/agent-handoff/config.toml`. Returns
    /// `Config::default()` silently when the file is absent or fails to
    /// parse.
    pub fn load() -> Config {
        let Some(home) = dirs::home_dir() else {
            return Config::default();
        };
        let path = home.join(".config/agent-handoff/config.toml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Config::default();
        };
        toml::from_str(&content).unwrap_or_default()
    }

    /// Resolve the configured output path, expanding a leading `~`.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output.as_deref().map(expand_tilde)
    }

    /// Resolve the configured default target agent, if any and if valid.
    pub fn target_source(&self) -> Option<Source> {
        self.target.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Expand a leading `~` or `~/` prefix to the user's home directory. A bare
/// `"~"` expands to the home directory itself; paths without a leading `~`
/// are returned unchanged.
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_with_path() {
        let result = expand_tilde("~/projects");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("projects"));
    }

    #[test]
    fn expand_tilde_bare() {
        let result = expand_tilde("~");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home);
    }

    #[test]
    fn expand_tilde_absolute_unchanged() {
        let result = expand_tilde("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn config_deserialize() {
        let toml_str = r#"
output = "~/handoffs"
target = "cursor"

[sources]
claude-code = "~/.claude/projects"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.output.as_deref(), Some("~/handoffs"));
        assert_eq!(config.target_source(), Some(Source::Cursor));
        assert_eq!(config.sources.claude_code.as_deref(), Some("~/.claude/projects"));
    }

    #[test]
    fn config_default_has_no_overrides() {
        let config = Config::default();
        assert!(config.output.is_none());
        assert!(config.target.is_none());
        assert!(config.sources.claude_code.is_none());
    }

    #[test]
    fn missing_file_yields_default() {
        let config = Config::load();
        let _ = config.output_path();
    }

    #[test]
    fn output_path_expands_tilde() {
        let config = Config { output: Some("~/handoffs".to_string()), ..Default::default() };
        let path = config.output_path().unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(path, home.join("handoffs"));
    }
}
