//! Shared parsing helpers for the append-only text-stream adapters
//! (claude-code, codex, droid, copilot, gemini).
//!
//! None of this is a unifying parsing engine: each adapter still owns its
//! own record shape and its own `parse_session` as an independent module.
//! What's shared here is the handful of rules that apply identically across
//! every stream-shaped source: role aliasing, content block text
//! accumulation, token-alias summation, and tool-argument path extraction.

use serde_json::Value;

use crate::model::Role;

/// Project path to fall back to when a session carries none of its own: the
/// caller's working directory, or `/` if that itself can't be read.
pub fn fallback_project_path() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "/".to_string())
}

/// Map a source-native role string to the canonical `Role`
/// (`developer -> system`, `human -> user`, `ai -> assistant`, unknown ->
/// assistant).
pub fn map_role_str(raw: &str) -> Role {
    match raw {
        "user" | "human" => Role::User,
        "assistant" | "ai" => Role::Assistant,
        "system" | "developer" => Role::System,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}

/// Map a numeric role code (`1 -> user`, `2 -> assistant`, unknown ->
/// assistant).
pub fn map_role_numeric(code: i64) -> Role {
    match code {
        1 => Role::User,
        2 => Role::Assistant,
        _ => Role::Assistant,
    }
}

/// Accumulate text content from a message's `content` field, which is either
/// a plain string or an ordered list of blocks. Blocks tagged `text`,
/// `output_text`, or `input_text` are concatenated with a newline between
/// them; every other block type is ignored by this helper (tool-use/result
/// blocks are handled separately by each adapter, since the synthetic
/// tool-message shape differs slightly per source).
pub fn extract_text_content(content: &Value) -> String {
    if let Some(s) = content.as_str() {
        return s.to_string();
    }
    let Some(blocks) = content.as_array() else {
        return String::new();
    };
    blocks
        .iter()
        .filter_map(|block| {
            let ty = block.get("type").and_then(|t| t.as_str())?;
            if matches!(ty, "text" | "output_text" | "input_text") {
                block.get("text").and_then(|t| t.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sum `input_tokens + output_tokens` from a usage object, accepting the
/// `prompt_tokens` / `completion_tokens` aliases some sources use instead.
pub fn usage_tokens(usage: &Value) -> u64 {
    let input = usage
        .get("input_tokens")
        .or_else(|| usage.get("prompt_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let output = usage
        .get("output_tokens")
        .or_else(|| usage.get("completion_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    input + output
}

/// Extract a target file path from a tool call's argument object, trying the
/// common key names in order.
pub fn extract_path_from_args(args: &Value) -> Option<String> {
    for key in ["path", "file_path", "filePath", "target"] {
        if let Some(p) = args.get(key).and_then(|v| v.as_str()) {
            return Some(p.to_string());
        }
    }
    None
}

/// For a shell-invocation tool call, extract a path from a trailing shell
/// redirection (`> path`). Returns `None` if no redirection is present.
pub fn extract_path_from_shell_redirect(command: &str) -> Option<String> {
    let trimmed = command.trim_end();
    let idx = trimmed.rfind('>')?;
    let after = trimmed[idx + 1..].trim_start().trim_start_matches('>').trim();
    if after.is_empty() {
        return None;
    }
    after.split_whitespace().next().map(|s| s.to_string())
}

/// Infer a display language tag from a file extension, for `FileChange`.
pub fn language_from_path(path: &str) -> Option<String> {
    let ext = std::path::Path::new(path).extension()?.to_str()?;
    let lang = match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "sh" | "bash" => "shell",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        _ => return None,
    };
    Some(lang.to_string())
}

/// Keep only the first occurrence of each `Some(id)`; items with `id ==
/// None` are always kept (there is nothing to dedup them against).
pub fn dedup_by_id<T>(items: Vec<(Option<String>, T)>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (id, item) in items {
        match id {
            Some(id) if !seen.insert(id) => continue,
            _ => out.push(item),
        }
    }
    out
}

/// Byte-safe truncation to at most `max` bytes — never splits a UTF-8
/// codepoint.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// One line of a generic append-only session stream: `{ id?, sessionId?,
/// timestamp?, cwd?, role, content, usage? }`. Droid, Copilot, and Gemini
/// sessions are all this shape on disk — unlike claude-code/codex they carry
/// no source-specific envelope, so one record type and one parsing routine
/// covers all three instead of each adapter duplicating it.
#[derive(serde::Deserialize)]
pub struct GenericRecord {
    pub id: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub role: Option<Value>,
    #[serde(default)]
    pub content: Value,
    pub usage: Option<Value>,
}

/// Parse a generic stream session for the given `source`, applying the same
/// line-handling rules as the claude-code/codex adapters: skip malformed
/// JSON lines, dedup by `id` keeping the first occurrence, map roles (string
/// or numeric), accumulate content-block text, and sum token usage.
pub fn parse_generic_stream<I: Iterator<Item = String>>(
    lines: I,
    source: crate::model::Source,
    fallback_session_id: &str,
) -> crate::model::CanonicalSession {
    use crate::model::{CanonicalSession, Conversation, ConversationMessage, ProjectContext, SCHEMA_VERSION};
    use chrono::{DateTime, Utc};

    let mut seen_ids = std::collections::HashSet::new();
    let mut session_id = None;
    let mut project_path = None;
    let mut started_at: Option<DateTime<Utc>> = None;
    let mut messages = Vec::new();
    let mut estimated_tokens = 0u64;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<GenericRecord>(trimmed) else {
            continue;
        };
        if let Some(id) = &record.id {
            if !seen_ids.insert(id.clone()) {
                continue;
            }
        }
        if session_id.is_none() {
            session_id = record.session_id.clone();
        }
        if project_path.is_none() {
            project_path = record.cwd.clone();
        }
        let ts = record
            .timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        if started_at.is_none() {
            started_at = ts;
        }

        let role = match &record.role {
            Some(Value::String(s)) => map_role_str(s),
            Some(Value::Number(n)) => n.as_i64().map(map_role_numeric).unwrap_or(crate::model::Role::Assistant),
            _ => crate::model::Role::Assistant,
        };
        if let Some(usage) = &record.usage {
            estimated_tokens += usage_tokens(usage);
        }
        let text = extract_text_content(&record.content);
        if !text.trim().is_empty() {
            messages.push(ConversationMessage {
                role,
                content: text,
                tool_name: None,
                timestamp: ts,
                token_count: None,
            });
        }
    }

    let message_count = messages.len();
    CanonicalSession {
        schema_version: SCHEMA_VERSION.to_string(),
        source,
        captured_at: Utc::now(),
        session_id: session_id.unwrap_or_else(|| fallback_session_id.to_string()),
        session_started_at: started_at,
        project: ProjectContext {
            path: project_path.unwrap_or_else(fallback_project_path),
            ..Default::default()
        },
        conversation: Conversation {
            message_count,
            estimated_tokens,
            messages,
        },
        files_changed: Vec::new(),
        decisions: Vec::new(),
        blockers: Vec::new(),
        task: crate::model::TaskState::default(),
        tool_activity: Vec::new(),
    }
}

/// Cheap listing summary for a generic stream session file, without building
/// the full normalized message list.
pub fn generic_session_info(path: &std::path::Path) -> std::io::Result<crate::model::SessionInfo> {
    use chrono::{DateTime, Utc};
    use std::io::BufRead;

    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut session_id = None;
    let mut project_path = None;
    let mut started_at: Option<DateTime<Utc>> = None;
    let mut last_active_at: Option<DateTime<Utc>> = None;
    let mut message_count = 0usize;
    let mut preview = String::new();

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<GenericRecord>(trimmed) else {
            continue;
        };
        if session_id.is_none() {
            session_id = record.session_id.clone();
        }
        if project_path.is_none() {
            project_path = record.cwd.clone();
        }
        let ts = record
            .timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        if started_at.is_none() {
            started_at = ts;
        }
        if ts.is_some() {
            last_active_at = ts;
        }
        let text = extract_text_content(&record.content);
        if !text.trim().is_empty() {
            message_count += 1;
            if preview.is_empty() {
                preview = text;
            }
        }
    }

    let id = session_id.unwrap_or_else(|| {
        path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
    });

    Ok(crate::model::SessionInfo {
        id,
        started_at,
        last_active_at: last_active_at.or(started_at).unwrap_or_else(Utc::now),
        message_count,
        project_path,
        preview: crate::model::SessionInfo::truncated_preview(&preview, 200),
    })
}

/// Every `*.jsonl` file under `root`, for the sources whose storage layout
/// is a flat directory of session files with no special filename prefix
/// (droid, copilot, gemini — unlike codex's `rollout-*` convention).
fn generic_session_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|e| e == "jsonl"))
        .collect()
}

/// Shared `list_sessions` body for the generic stream adapters.
pub fn list_generic_sessions(
    source: crate::model::Source,
    project_path: Option<&std::path::Path>,
) -> Vec<crate::model::SessionInfo> {
    let Some(root) = crate::registry::descriptor(source).storage_root().filter(|p| p.exists()) else {
        return Vec::new();
    };
    let mut infos: Vec<crate::model::SessionInfo> = generic_session_files(&root)
        .into_iter()
        .filter_map(|path| generic_session_info(&path).ok())
        .filter(|info| project_path.is_none_or(|p| info.project_path.as_deref() == p.to_str()))
        .collect();
    infos.sort_by(|a, b| {
        b.last_active_at
            .cmp(&a.last_active_at)
            .then_with(|| b.started_at.cmp(&a.started_at))
    });
    infos
}

/// Shared `capture` body for the generic stream adapters.
pub fn capture_generic(
    source: crate::model::Source,
    session_id: &str,
) -> Result<crate::model::CanonicalSession, crate::error::HandoffError> {
    use std::io::BufRead;

    let Some(root) = crate::registry::descriptor(source).storage_root().filter(|p| p.exists()) else {
        return Err(crate::error::HandoffError::NotFound(format!("no sessions for {source}")));
    };
    let path = generic_session_files(&root)
        .into_iter()
        .find(|p| {
            p.file_stem()
                .map(|s| s.to_string_lossy().contains(session_id))
                .unwrap_or(false)
        })
        .ok_or_else(|| crate::error::HandoffError::NotFound(format!("no session {session_id} for {source}")))?;
    let file = std::fs::File::open(&path)?;
    let reader = std::io::BufReader::new(file);
    let fallback_id = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let session = parse_generic_stream(reader.lines().map_while(Result::ok), source, &fallback_id);
    crate::validate::validate(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_known_role_aliases() {
        assert_eq!(map_role_str("human"), Role::User);
        assert_eq!(map_role_str("ai"), Role::Assistant);
        assert_eq!(map_role_str("developer"), Role::System);
        assert_eq!(map_role_str("whatever"), Role::Assistant);
    }

    #[test]
    fn maps_numeric_roles() {
        assert_eq!(map_role_numeric(1), Role::User);
        assert_eq!(map_role_numeric(2), Role::Assistant);
        assert_eq!(map_role_numeric(99), Role::Assistant);
    }

    #[test]
    fn extracts_text_from_string_content() {
        assert_eq!(extract_text_content(&json!("hello")), "hello");
    }

    #[test]
    fn extracts_and_joins_text_blocks() {
        let content = json!([
            {"type": "text", "text": "first"},
            {"type": "tool_use", "name": "Read"},
            {"type": "output_text", "text": "second"},
        ]);
        assert_eq!(extract_text_content(&content), "first\nsecond");
    }

    #[test]
    fn sums_token_aliases() {
        let usage = json!({"prompt_tokens": 10, "completion_tokens": 5});
        assert_eq!(usage_tokens(&usage), 15);
    }

    #[test]
    fn sums_native_token_names() {
        let usage = json!({"input_tokens": 3, "output_tokens": 4});
        assert_eq!(usage_tokens(&usage), 7);
    }

    #[test]
    fn extracts_path_from_known_keys() {
        assert_eq!(
            extract_path_from_args(&json!({"file_path": "/a/b.rs"})),
            Some("/a/b.rs".to_string())
        );
        assert_eq!(
            extract_path_from_args(&json!({"filePath": "/a/b.rs"})),
            Some("/a/b.rs".to_string())
        );
        assert_eq!(extract_path_from_args(&json!({"other": 1})), None);
    }

    #[test]
    fn extracts_path_from_shell_redirect() {
        assert_eq!(
            extract_path_from_shell_redirect("echo hi > out.txt"),
            Some("out.txt".to_string())
        );
        assert_eq!(extract_path_from_shell_redirect("ls -la"), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let items = vec![
            (Some("a".to_string()), 1),
            (Some("b".to_string()), 2),
            (Some("a".to_string()), 3),
            (None, 4),
        ];
        assert_eq!(dedup_by_id(items), vec![1, 2, 4]);
    }

    #[test]
    fn language_inferred_from_extension() {
        assert_eq!(language_from_path("foo.rs").as_deref(), Some("rust"));
        assert_eq!(language_from_path("foo.unknown"), None);
    }

    #[test]
    fn generic_stream_dedups_and_maps_roles() {
        let raw = vec![
            r#"{"id":"1","sessionId":"s1","cwd":"/repo","role":"human","content":"hi there friend"}"#.to_string(),
            r#"{"id":"1","sessionId":"s1","cwd":"/repo","role":"human","content":"duplicate"}"#.to_string(),
            r#"{"id":"2","sessionId":"s1","cwd":"/repo","role":"ai","content":"hello back"}"#.to_string(),
        ];
        let session = parse_generic_stream(raw.into_iter(), crate::model::Source::Droid, "fallback");
        assert_eq!(session.conversation.message_count, 2);
        assert_eq!(session.conversation.messages[0].role, Role::User);
        assert_eq!(session.conversation.messages[1].role, Role::Assistant);
        assert_eq!(session.project.path, "/repo");
    }
}
