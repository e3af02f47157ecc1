//! Canonical session data model.
//!
//! # Architecture overview
//!
//! Every adapter converts its source-native storage into a `CanonicalSession`.
//! Everything downstream — the analyzer, enrichment, compression, the prompt
//! builder, the watcher's diffing — operates only on this type, never on a
//! source's native schema. This is the same normalize-once design used
//! throughout the adapter layer: parsers own the messy tool-specific shape,
//! everything after the parser boundary sees one shape.
//!
//! # Serialization
//!
//! Field names are camelCase, since the canonical session is also an
//! external interface (`.handoff/session.json`).
//!
//! # Invariants (enforced in `validate.rs`, not here)
//!
//! This module only holds data. The six invariants on `CanonicalSession`
//! (message count matches length, timestamp ordering, unique file-change
//! paths, case-insensitive uniqueness of decisions/blockers, valid ISO-8601
//! timestamps, absolute project path) are checked by `validate::validate`,
//! which every adapter must route its assembled record through before
//! returning from `capture`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "1.0";

/// Which AI coding assistant produced a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    ClaudeCode,
    Cursor,
    Codex,
    Copilot,
    Gemini,
    Opencode,
    Droid,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::ClaudeCode => "claude-code",
            Source::Cursor => "cursor",
            Source::Codex => "codex",
            Source::Copilot => "copilot",
            Source::Gemini => "gemini",
            Source::Opencode => "opencode",
            Source::Droid => "droid",
        }
    }

    pub fn all() -> &'static [Source] {
        &[
            Source::ClaudeCode,
            Source::Cursor,
            Source::Codex,
            Source::Copilot,
            Source::Gemini,
            Source::Opencode,
            Source::Droid,
        ]
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" => Ok(Source::ClaudeCode),
            "cursor" => Ok(Source::Cursor),
            "codex" => Ok(Source::Codex),
            "copilot" => Ok(Source::Copilot),
            "gemini" => Ok(Source::Gemini),
            "opencode" => Ok(Source::Opencode),
            "droid" => Ok(Source::Droid),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Speaker role of a single message in the canonical conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One turn in the canonical conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

/// How a file was touched during the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Structured task state extracted by the analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub description: String,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub remaining: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub git_log: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_file_contents: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolActivitySummary {
    pub name: String,
    pub count: u32,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub message_count: usize,
    pub estimated_tokens: u64,
    pub messages: Vec<ConversationMessage>,
}

/// A single normalized AI coding session, produced by an adapter and consumed
/// by every downstream stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSession {
    pub schema_version: String,
    pub source: Source,
    pub captured_at: DateTime<Utc>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_started_at: Option<DateTime<Utc>>,
    pub project: ProjectContext,
    pub conversation: Conversation,
    #[serde(default)]
    pub files_changed: Vec<FileChange>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    pub task: TaskState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_activity: Vec<ToolActivitySummary>,
}

impl CanonicalSession {
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.source.as_str(), self.session_id)
    }
}

/// Cheap per-session summary used by `listSessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub last_active_at: DateTime<Utc>,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    pub preview: String,
}

impl SessionInfo {
    /// Truncate a preview to at most `max` chars without splitting a
    /// codepoint (callers pass the 200-char cap used for `list`/`detect`
    /// output).
    pub fn truncated_preview(raw: &str, max: usize) -> String {
        let trimmed = raw.trim();
        let mut end = trimmed.len().min(max);
        while end > 0 && !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_display_and_from_str() {
        for src in Source::all() {
            let parsed: Source = src.as_str().parse().unwrap();
            assert_eq!(parsed, *src);
        }
    }

    #[test]
    fn session_key_combines_source_and_id() {
        let session = sample_session();
        assert_eq!(session.session_key(), "claude-code:abc123");
    }

    #[test]
    fn preview_truncation_respects_char_boundaries() {
        let raw = "héllo world ".repeat(30);
        let preview = SessionInfo::truncated_preview(&raw, 200);
        assert!(preview.len() <= 200);
    }

    fn sample_session() -> CanonicalSession {
        CanonicalSession {
            schema_version: SCHEMA_VERSION.to_string(),
            source: Source::ClaudeCode,
            captured_at: Utc::now(),
            session_id: "abc123".to_string(),
            session_started_at: None,
            project: ProjectContext {
                path: "/tmp/project".to_string(),
                ..Default::default()
            },
            conversation: Conversation {
                message_count: 0,
                estimated_tokens: 0,
                messages: Vec::new(),
            },
            files_changed: Vec::new(),
            decisions: Vec::new(),
            blockers: Vec::new(),
            task: TaskState::default(),
            tool_activity: Vec::new(),
        }
    }
}
