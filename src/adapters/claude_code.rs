//! Claude Code adapter: append-only JSONL session files under
//! `~/.claude/projects/<path-hash>/<session-id>.jsonl`.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::adapters::common;
use crate::adapters::AgentAdapter;
use crate::error::HandoffError;
use crate::model::*;
use crate::pathhash;
use crate::registry;
use crate::validate;

pub struct ClaudeCodeAdapter;

impl AgentAdapter for ClaudeCodeAdapter {
    fn source(&self) -> Source {
        Source::ClaudeCode
    }

    fn detect(&self) -> bool {
        storage_root().is_some()
    }

    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo> {
        let Some(root) = storage_root() else {
            return Vec::new();
        };
        let mut infos: Vec<SessionInfo> = session_files(&root)
            .into_iter()
            .filter(|path| {
                project_path.is_none_or(|p| project_dir_matches(path, &root, p))
            })
            .filter_map(|path| session_info(&path).ok())
            .collect();
        infos.sort_by(|a, b| {
            b.last_active_at
                .cmp(&a.last_active_at)
                .then_with(|| b.started_at.cmp(&a.started_at))
        });
        infos
    }

    fn capture(&self, session_id: &str) -> Result<CanonicalSession, HandoffError> {
        let Some(root) = storage_root() else {
            return Err(HandoffError::NotFound(format!(
                "no sessions for {}",
                Source::ClaudeCode
            )));
        };
        let path = session_files(&root)
            .into_iter()
            .find(|p| file_stem(p) == session_id)
            .ok_or_else(|| HandoffError::NotFound(format!("no session {session_id} for claude-code")))?;
        let session = parse_session_file(&path)?;
        validate::validate(session)
    }
}

fn storage_root() -> Option<PathBuf> {
    let descriptor = registry::descriptor(Source::ClaudeCode);
    if let Some(root) = descriptor.storage_root() {
        if root.exists() {
            return Some(root);
        }
    }
    descriptor.wsl_fallback_roots().into_iter().find(|p| p.exists())
}

fn session_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension().is_some_and(|e| e == "jsonl")
                && !p.file_name().is_some_and(|n| n.to_string_lossy().contains(".bak"))
        })
        .collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
}

/// A session file's enclosing directory matches `project_path` when it
/// decodes (via the path-hash codec) to that path, or when the session's
/// first recognizable `cwd` field equals it.
fn project_dir_matches(session_path: &Path, root: &Path, project_path: &Path) -> bool {
    let Some(parent) = session_path.parent() else {
        return false;
    };
    let Some(dirname) = parent.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return false;
    };
    if parent == root {
        return false;
    }
    if let Some(decoded) = pathhash::decode(&dirname) {
        if Path::new(&decoded) == project_path {
            return true;
        }
    }
    false
}

#[derive(Deserialize)]
struct SessionRecord {
    #[serde(rename = "type")]
    record_type: String,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    #[serde(rename = "uuid")]
    id: Option<String>,
    message: Option<Value>,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).ok()
}

/// Cheap listing summary: scans just enough of the file to report counts and
/// a preview without building the full normalized message list.
fn session_info(path: &Path) -> Result<SessionInfo, HandoffError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut message_count = 0usize;
    let mut started_at = None;
    let mut last_active_at = None;
    let mut preview = String::new();
    let mut project_path = None;

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<SessionRecord>(trimmed) else {
            continue;
        };
        let ts = record.timestamp.as_deref().and_then(parse_timestamp);
        if started_at.is_none() {
            started_at = ts;
        }
        if ts.is_some() {
            last_active_at = ts;
        }
        if project_path.is_none() {
            project_path = record.cwd.clone();
        }
        if matches!(record.record_type.as_str(), "user" | "assistant") {
            message_count += 1;
            if preview.is_empty() {
                if let Some(msg) = &record.message {
                    let text = common::extract_text_content(msg.get("content").unwrap_or(&Value::Null));
                    if !text.trim().is_empty() {
                        preview = text;
                    }
                }
            }
        }
    }

    let project_path = project_path.or_else(|| {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| pathhash::decode(&n.to_string_lossy()))
    });

    Ok(SessionInfo {
        id: file_stem(path),
        started_at,
        last_active_at: last_active_at.or(started_at).unwrap_or_else(Utc::now),
        message_count,
        project_path,
        preview: SessionInfo::truncated_preview(&preview, 200),
    })
}

fn parse_session_file(path: &Path) -> Result<CanonicalSession, HandoffError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    parse_lines(reader.lines().map_while(Result::ok), Some(path))
}

fn parse_lines<I: Iterator<Item = String>>(
    lines: I,
    path: Option<&Path>,
) -> Result<CanonicalSession, HandoffError> {
    let mut session_id = None;
    let mut started_at: Option<DateTime<Utc>> = None;
    let mut cwd: Option<String> = None;
    let mut seen_ids = std::collections::HashSet::new();
    let mut messages: Vec<ConversationMessage> = Vec::new();
    let mut files_changed: Vec<FileChange> = Vec::new();
    let mut tool_counts: HashMap<String, (u32, Vec<String>)> = HashMap::new();
    let mut estimated_tokens: u64 = 0;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<SessionRecord>(trimmed) else {
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
        if cwd.is_none() {
            cwd = record.cwd.clone();
        }
        let ts = record.timestamp.as_deref().and_then(parse_timestamp);
        if started_at.is_none() {
            started_at = ts;
        }

        let Some(message) = &record.message else { continue };
        let role = message
            .get("role")
            .and_then(|r| r.as_str())
            .map(common::map_role_str)
            .unwrap_or(Role::Assistant);
        let content_value = message.get("content").cloned().unwrap_or(Value::Null);

        if let Some(usage) = message.get("usage") {
            estimated_tokens += common::usage_tokens(usage);
        }

        let text = common::extract_text_content(&content_value);
        if !text.trim().is_empty() {
            messages.push(ConversationMessage {
                role,
                content: text,
                tool_name: None,
                timestamp: ts,
                token_count: None,
            });
        }

        if let Some(blocks) = content_value.as_array() {
            for block in blocks {
                let Some(ty) = block.get("type").and_then(|t| t.as_str()) else { continue };
                if ty == "tool_use" {
                    let name = block.get("name").and_then(|n| n.as_str()).unwrap_or("unknown").to_string();
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    messages.push(ConversationMessage {
                        role: Role::Tool,
                        content: format!("{name}({input})"),
                        tool_name: Some(name.clone()),
                        timestamp: ts,
                        token_count: None,
                    });
                    record_file_change(&name, &input, &mut files_changed);
                    let entry = tool_counts.entry(name).or_insert((0, Vec::new()));
                    entry.0 += 1;
                    if entry.1.len() < 3 {
                        entry.1.push(common::truncate(&input.to_string(), 80).to_string());
                    }
                } else if ty == "tool_result" {
                    let content = block.get("content").cloned().unwrap_or(Value::Null);
                    let text = common::extract_text_content(&content);
                    messages.push(ConversationMessage {
                        role: Role::Tool,
                        content: text,
                        tool_name: None,
                        timestamp: ts,
                        token_count: None,
                    });
                }
            }
        }
    }

    let project_path = cwd
        .or_else(|| {
            path.and_then(|p| p.parent())
                .and_then(|p| p.file_name())
                .and_then(|n| pathhash::decode(&n.to_string_lossy()))
        })
        .unwrap_or_else(common::fallback_project_path);

    let message_count = messages.len();
    let tool_activity = tool_counts
        .into_iter()
        .map(|(name, (count, samples))| ToolActivitySummary { name, count, samples })
        .collect();

    Ok(CanonicalSession {
        schema_version: SCHEMA_VERSION.to_string(),
        source: Source::ClaudeCode,
        captured_at: Utc::now(),
        session_id: session_id.or_else(|| path.map(|p| file_stem(p))).unwrap_or_default(),
        session_started_at: started_at,
        project: ProjectContext {
            path: project_path,
            ..Default::default()
        },
        conversation: Conversation {
            message_count,
            estimated_tokens,
            messages,
        },
        files_changed,
        decisions: Vec::new(),
        blockers: Vec::new(),
        task: TaskState::default(),
        tool_activity,
    })
}

const WRITE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

fn record_file_change(tool_name: &str, input: &Value, out: &mut Vec<FileChange>) {
    let path = if WRITE_TOOLS.contains(&tool_name) {
        common::extract_path_from_args(input)
    } else if tool_name == "Bash" {
        input
            .get("command")
            .and_then(|c| c.as_str())
            .and_then(common::extract_path_from_shell_redirect)
    } else {
        None
    };
    let Some(path) = path else { return };
    let change_type = match tool_name {
        "Write" => ChangeType::Created,
        _ => ChangeType::Modified,
    };
    let language = common::language_from_path(&path);
    if let Some(existing) = out.iter_mut().find(|c| c.path == path) {
        existing.change_type = change_type;
        existing.language = language;
    } else {
        out.push(FileChange { path, change_type, diff: None, language });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &str) -> impl Iterator<Item = String> {
        raw.lines().map(|l| l.to_string())
    }

    #[test]
    fn parses_user_and_assistant_messages() {
        let raw = r#"
{"type":"user","sessionId":"s1","cwd":"/repo","timestamp":"2024-01-01T00:00:00Z","uuid":"u1","message":{"role":"user","content":"hello there, please fix the bug"}}
{"type":"assistant","sessionId":"s1","cwd":"/repo","timestamp":"2024-01-01T00:01:00Z","uuid":"u2","message":{"role":"assistant","content":[{"type":"text","text":"done"}]}}
"#;
        let session = parse_lines(lines(raw), None).unwrap();
        assert_eq!(session.conversation.message_count, 2);
        assert_eq!(session.project.path, "/repo");
        assert_eq!(session.session_id, "s1");
    }

    #[test]
    fn skips_malformed_lines() {
        let raw = "not json\n{\"type\":\"user\",\"sessionId\":\"s1\",\"cwd\":\"/repo\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"uuid\":\"u1\",\"message\":{\"role\":\"user\",\"content\":\"hi there friend\"}}\n";
        let session = parse_lines(lines(raw), None).unwrap();
        assert_eq!(session.conversation.message_count, 1);
    }

    #[test]
    fn dedups_by_uuid_keeping_first() {
        let raw = r#"
{"type":"user","sessionId":"s1","cwd":"/repo","timestamp":"2024-01-01T00:00:00Z","uuid":"u1","message":{"role":"user","content":"first version here"}}
{"type":"user","sessionId":"s1","cwd":"/repo","timestamp":"2024-01-01T00:00:01Z","uuid":"u1","message":{"role":"user","content":"duplicate should be dropped"}}
"#;
        let session = parse_lines(lines(raw), None).unwrap();
        assert_eq!(session.conversation.message_count, 1);
        assert_eq!(session.conversation.messages[0].content, "first version here");
    }

    #[test]
    fn extracts_file_change_from_write_tool() {
        let raw = r#"
{"type":"assistant","sessionId":"s1","cwd":"/repo","timestamp":"2024-01-01T00:00:00Z","uuid":"u1","message":{"role":"assistant","content":[{"type":"tool_use","name":"Write","input":{"file_path":"src/main.rs"}}]}}
"#;
        let session = parse_lines(lines(raw), None).unwrap();
        assert_eq!(session.files_changed.len(), 1);
        assert_eq!(session.files_changed[0].path, "src/main.rs");
        assert_eq!(session.files_changed[0].change_type, ChangeType::Created);
    }

    #[test]
    fn extracts_file_change_from_shell_redirect() {
        let raw = r#"
{"type":"assistant","sessionId":"s1","cwd":"/repo","timestamp":"2024-01-01T00:00:00Z","uuid":"u1","message":{"role":"assistant","content":[{"type":"tool_use","name":"Bash","input":{"command":"echo hi > notes.txt"}}]}}
"#;
        let session = parse_lines(lines(raw), None).unwrap();
        assert_eq!(session.files_changed[0].path, "notes.txt");
    }

    #[test]
    fn falls_back_to_path_hash_when_cwd_absent() {
        let raw = r#"
{"type":"user","sessionId":"s1","timestamp":"2024-01-01T00:00:00Z","uuid":"u1","message":{"role":"user","content":"hi there again friend"}}
"#;
        let path = Path::new("/home/me/.claude/projects/-Users-me-proj/s1.jsonl");
        let session = parse_lines(lines(raw), Some(path)).unwrap();
        assert_eq!(session.project.path, "/Users/me/proj");
    }
}
