//! Codex adapter: append-only JSONL session files under
//! `~/.codex/sessions/**/rollout-*.jsonl`.
//!
//! Every record shares a `{ timestamp, type, payload }` envelope. `type`
//! dispatches to one of `session_meta` (one-time header), `event_msg` (user
//! input), `response_item` (assistant output and function calls), or
//! `turn_context` (model name for the next turn). Codex calls a tool call a
//! "function call" — `call_id` links a `function_call` to its later
//! `function_call_output`.

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
use crate::registry;
use crate::validate;

pub struct CodexAdapter;

impl AgentAdapter for CodexAdapter {
    fn source(&self) -> Source {
        Source::Codex
    }

    fn detect(&self) -> bool {
        storage_root().is_some()
    }

    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo> {
        let Some(root) = storage_root() else {
            return Vec::new();
        };
        let mut infos: Vec<SessionInfo> = rollout_files(&root)
            .into_iter()
            .filter_map(|path| session_info(&path).ok())
            .filter(|info| project_path.is_none_or(|p| info.project_path.as_deref() == p.to_str()))
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
            return Err(HandoffError::NotFound(format!("no sessions for {}", Source::Codex)));
        };
        let path = rollout_files(&root)
            .into_iter()
            .find(|p| matches_session_id(p, session_id))
            .ok_or_else(|| HandoffError::NotFound(format!("no session {session_id} for codex")))?;
        let session = parse_session_file(&path)?;
        validate::validate(session)
    }
}

fn storage_root() -> Option<PathBuf> {
    let descriptor = registry::descriptor(Source::Codex);
    descriptor.storage_root().filter(|p| p.exists())
}

fn rollout_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension().is_some_and(|e| e == "jsonl")
                && p.file_name().is_some_and(|n| n.to_string_lossy().starts_with("rollout-"))
        })
        .collect()
}

fn matches_session_id(path: &Path, session_id: &str) -> bool {
    path.file_stem().map(|s| s.to_string_lossy().contains(session_id)).unwrap_or(false)
}

#[derive(Deserialize)]
struct CodexRecord {
    timestamp: String,
    #[serde(rename = "type")]
    record_type: String,
    payload: Value,
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok()
}

fn session_info(path: &Path) -> Result<SessionInfo, HandoffError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut session_id = None;
    let mut project_path = None;
    let mut started_at = None;
    let mut last_active_at = None;
    let mut message_count = 0usize;
    let mut preview = String::new();

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<CodexRecord>(trimmed) else { continue };
        let ts = parse_ts(&record.timestamp);
        if started_at.is_none() {
            started_at = ts;
        }
        if ts.is_some() {
            last_active_at = ts;
        }
        match record.record_type.as_str() {
            "session_meta" => {
                session_id = record.payload.get("id").and_then(|v| v.as_str()).map(String::from);
                project_path = record.payload.get("cwd").and_then(|v| v.as_str()).map(String::from);
            }
            "event_msg" => {
                if record.payload.get("type").and_then(|v| v.as_str()) == Some("user_message") {
                    message_count += 1;
                    if preview.is_empty() {
                        if let Some(text) = record.payload.get("message").and_then(|v| v.as_str()) {
                            preview = text.to_string();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(SessionInfo {
        id: session_id.unwrap_or_else(|| file_stem(path)),
        started_at,
        last_active_at: last_active_at.or(started_at).unwrap_or_else(Utc::now),
        message_count,
        project_path,
        preview: SessionInfo::truncated_preview(&preview, 200),
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
}

fn parse_session_file(path: &Path) -> Result<CanonicalSession, HandoffError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    parse_lines(reader.lines().map_while(Result::ok), path)
}

fn parse_lines<I: Iterator<Item = String>>(lines: I, path: &Path) -> Result<CanonicalSession, HandoffError> {
    let mut session_id = None;
    let mut project_path = None;
    let mut started_at: Option<DateTime<Utc>> = None;
    let mut messages = Vec::new();
    let mut pending_functions: HashMap<String, (String, String)> = HashMap::new();
    let mut files_changed = Vec::new();
    let mut tool_counts: HashMap<String, (u32, Vec<String>)> = HashMap::new();
    let mut estimated_tokens = 0u64;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<CodexRecord>(trimmed) else { continue };
        let ts = parse_ts(&record.timestamp);
        if started_at.is_none() {
            started_at = ts;
        }

        match record.record_type.as_str() {
            "session_meta" => {
                session_id = record.payload.get("id").and_then(|v| v.as_str()).map(String::from);
                project_path = record.payload.get("cwd").and_then(|v| v.as_str()).map(String::from);
            }
            "event_msg" => {
                let event_type = record.payload.get("type").and_then(|v| v.as_str()).unwrap_or("");
                if event_type == "user_message" {
                    if let Some(text) = record.payload.get("message").and_then(|v| v.as_str()) {
                        if !text.trim().is_empty() {
                            messages.push(ConversationMessage {
                                role: Role::User,
                                content: text.to_string(),
                                tool_name: None,
                                timestamp: ts,
                                token_count: None,
                            });
                        }
                    }
                } else if event_type == "token_count" {
                    estimated_tokens += common::usage_tokens(&record.payload);
                }
            }
            "response_item" => {
                let payload_type = record.payload.get("type").and_then(|v| v.as_str()).unwrap_or("");
                match payload_type {
                    "message" => {
                        if record.payload.get("role").and_then(|v| v.as_str()) == Some("assistant") {
                            let text = common::extract_text_content(
                                record.payload.get("content").unwrap_or(&Value::Null),
                            );
                            if !text.trim().is_empty() {
                                messages.push(ConversationMessage {
                                    role: Role::Assistant,
                                    content: text,
                                    tool_name: None,
                                    timestamp: ts,
                                    token_count: None,
                                });
                            }
                        }
                    }
                    "function_call" => {
                        let call_id = record.payload.get("call_id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                        let name = record.payload.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                        let args = record.payload.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}").to_string();
                        if !call_id.is_empty() {
                            pending_functions.insert(call_id, (name, args));
                        }
                    }
                    "function_call_output" => {
                        let call_id = record.payload.get("call_id").and_then(|v| v.as_str()).unwrap_or("");
                        if let Some((name, args_json)) = pending_functions.remove(call_id) {
                            let args: Value = serde_json::from_str(&args_json).unwrap_or(Value::Null);
                            messages.push(ConversationMessage {
                                role: Role::Tool,
                                content: format!("{name}({args_json})"),
                                tool_name: Some(name.clone()),
                                timestamp: ts,
                                token_count: None,
                            });
                            if name == "shell" {
                                record_shell_file_change(&args, &mut files_changed);
                            }
                            let entry = tool_counts.entry(name).or_insert((0, Vec::new()));
                            entry.0 += 1;
                            if entry.1.len() < 3 {
                                entry.1.push(common::truncate(&args_json, 80).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    let message_count = messages.len();
    let tool_activity = tool_counts
        .into_iter()
        .map(|(name, (count, samples))| ToolActivitySummary { name, count, samples })
        .collect();

    Ok(CanonicalSession {
        schema_version: SCHEMA_VERSION.to_string(),
        source: Source::Codex,
        captured_at: Utc::now(),
        session_id: session_id.unwrap_or_else(|| file_stem(path)),
        session_started_at: started_at,
        project: ProjectContext {
            path: project_path.unwrap_or_else(common::fallback_project_path),
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

fn record_shell_file_change(args: &Value, out: &mut Vec<FileChange>) {
    let command = args.get("command").map(|c| {
        if let Some(arr) = c.as_array() {
            arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(" ")
        } else {
            c.as_str().unwrap_or("").to_string()
        }
    });
    let Some(command) = command else { return };
    let Some(path) = common::extract_path_from_shell_redirect(&command) else { return };
    let language = common::language_from_path(&path);
    out.push(FileChange {
        path,
        change_type: ChangeType::Modified,
        diff: None,
        language,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &str) -> impl Iterator<Item = String> {
        raw.lines().map(|l| l.to_string())
    }

    #[test]
    fn parses_session_meta_and_user_message() {
        let raw = r#"
{"timestamp":"2024-01-01T00:00:00Z","type":"session_meta","payload":{"id":"s1","cwd":"/repo"}}
{"timestamp":"2024-01-01T00:00:01Z","type":"event_msg","payload":{"type":"user_message","message":"please add tests"}}
"#;
        let session = parse_lines(lines(raw), Path::new("rollout-s1.jsonl")).unwrap();
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.project.path, "/repo");
        assert_eq!(session.conversation.message_count, 1);
    }

    #[test]
    fn pairs_function_call_with_output() {
        let raw = r#"
{"timestamp":"2024-01-01T00:00:00Z","type":"session_meta","payload":{"id":"s1","cwd":"/repo"}}
{"timestamp":"2024-01-01T00:00:01Z","type":"response_item","payload":{"type":"function_call","call_id":"c1","name":"shell","arguments":"{\"command\":\"echo hi > out.txt\"}"}}
{"timestamp":"2024-01-01T00:00:02Z","type":"response_item","payload":{"type":"function_call_output","call_id":"c1","output":"{\"exit_code\":0}"}}
"#;
        let session = parse_lines(lines(raw), Path::new("rollout-s1.jsonl")).unwrap();
        assert_eq!(session.files_changed.len(), 1);
        assert_eq!(session.files_changed[0].path, "out.txt");
        assert_eq!(session.tool_activity.len(), 1);
    }

    #[test]
    fn falls_back_to_filename_for_missing_session_id() {
        let raw = "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"type\":\"turn_context\",\"payload\":{}}";
        let session = parse_lines(lines(raw), Path::new("rollout-fallback.jsonl")).unwrap();
        assert_eq!(session.session_id, "rollout-fallback");
    }
}
