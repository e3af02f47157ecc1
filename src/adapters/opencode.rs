//! OpenCode adapter: fragmented JSON storage under
//! `~/.local/share/opencode/storage/{session,message,part}/`.
//!
//! Unlike the line-stream sources, a session is assembled from three
//! directory trees: `session/<project_id>/<session_id>.json` holds metadata,
//! `message/<session_id>/<message_id>.json` holds one file per turn, and
//! `part/<message_id>/<part_id>.json` holds one file per content block.
//! Messages carry no embedded order, so they're sorted by `time.created`
//! after loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::adapters::common;
use crate::adapters::AgentAdapter;
use crate::error::HandoffError;
use crate::model::*;
use crate::registry;
use crate::validate;

pub struct OpenCodeAdapter;

impl AgentAdapter for OpenCodeAdapter {
    fn source(&self) -> Source {
        Source::Opencode
    }

    fn detect(&self) -> bool {
        storage_root().is_some()
    }

    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo> {
        let Some(root) = storage_root() else {
            return Vec::new();
        };
        let mut infos: Vec<SessionInfo> = session_ids(&root)
            .into_iter()
            .filter_map(|id| session_info(&root, &id).ok())
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
            return Err(HandoffError::NotFound(format!("no sessions for {}", Source::Opencode)));
        };
        let session = parse_session(&root, session_id)?;
        validate::validate(session)
    }
}

fn storage_root() -> Option<PathBuf> {
    registry::descriptor(Source::Opencode).storage_root().filter(|p| p.exists())
}

/// Every `ses_*` session id found under `message/`.
fn session_ids(storage_dir: &Path) -> Vec<String> {
    let message_dir = storage_dir.join("message");
    let Ok(entries) = std::fs::read_dir(&message_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("ses_").then_some(name)
        })
        .collect()
}

#[derive(Deserialize)]
struct OcSession {
    id: String,
    directory: Option<String>,
    title: Option<String>,
    time: Option<OcTime>,
}

#[derive(Deserialize)]
struct OcTime {
    created: Option<f64>,
}

#[derive(Deserialize)]
struct OcMessage {
    id: String,
    role: Option<String>,
    time: Option<OcMsgTime>,
    usage: Option<OcUsage>,
}

#[derive(Deserialize)]
struct OcMsgTime {
    created: Option<f64>,
    completed: Option<f64>,
}

#[derive(Deserialize)]
struct OcUsage {
    input: Option<u64>,
    output: Option<u64>,
}

#[derive(Deserialize)]
struct OcPart {
    #[serde(rename = "type")]
    part_type: Option<String>,
    text: Option<String>,
    synthetic: Option<bool>,
    tool: Option<String>,
    state: Option<Value>,
}

fn timestamp_from_millis(ms: f64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64).single().unwrap_or_else(Utc::now)
}

fn find_session_file(storage_dir: &Path, session_id: &str) -> Option<OcSession> {
    let session_dir = storage_dir.join("session");
    for entry in std::fs::read_dir(&session_dir).ok()?.filter_map(|e| e.ok()) {
        let candidate = entry.path().join(format!("{session_id}.json"));
        if candidate.is_file() {
            if let Ok(raw) = std::fs::read_to_string(&candidate) {
                if let Ok(session) = serde_json::from_str(&raw) {
                    return Some(session);
                }
            }
        }
    }
    None
}

fn load_messages(storage_dir: &Path, session_id: &str) -> Vec<OcMessage> {
    let dir = storage_dir.join("message").join(session_id);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut messages: Vec<OcMessage> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| std::fs::read_to_string(e.path()).ok())
        .filter_map(|raw| serde_json::from_str(&raw).ok())
        .collect();
    messages.sort_by(|a: &OcMessage, b: &OcMessage| {
        let ta = a.time.as_ref().and_then(|t| t.created).unwrap_or(0.0);
        let tb = b.time.as_ref().and_then(|t| t.created).unwrap_or(0.0);
        ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal)
    });
    messages
}

fn load_parts(storage_dir: &Path, message_id: &str) -> Vec<OcPart> {
    let dir = storage_dir.join("part").join(message_id);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| std::fs::read_to_string(e.path()).ok())
        .filter_map(|raw| serde_json::from_str(&raw).ok())
        .collect()
}

fn session_info(storage_dir: &Path, session_id: &str) -> Result<SessionInfo, HandoffError> {
    let meta = find_session_file(storage_dir, session_id);
    let messages = load_messages(storage_dir, session_id);
    let started_at = meta
        .as_ref()
        .and_then(|m| m.time.as_ref())
        .and_then(|t| t.created)
        .map(timestamp_from_millis);
    let last_active_at = messages
        .iter()
        .filter_map(|m| m.time.as_ref().and_then(|t| t.completed.or(t.created)))
        .last()
        .map(timestamp_from_millis)
        .or(started_at)
        .unwrap_or_else(Utc::now);

    let mut preview = String::new();
    for msg in &messages {
        if msg.role.as_deref() != Some("user") {
            continue;
        }
        let parts = load_parts(storage_dir, &msg.id);
        let text = text_from_parts(&parts);
        if !text.trim().is_empty() {
            preview = text;
            break;
        }
    }

    Ok(SessionInfo {
        id: session_id.to_string(),
        started_at,
        last_active_at,
        message_count: messages.len(),
        project_path: meta.and_then(|m| m.directory),
        preview: SessionInfo::truncated_preview(&preview, 200),
    })
}

fn text_from_parts(parts: &[OcPart]) -> String {
    parts
        .iter()
        .filter(|p| p.part_type.as_deref() == Some("text") && !p.synthetic.unwrap_or(false))
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_session(storage_dir: &Path, session_id: &str) -> Result<CanonicalSession, HandoffError> {
    let meta = find_session_file(storage_dir, session_id);
    let oc_messages = load_messages(storage_dir, session_id);

    let started_at = meta
        .as_ref()
        .and_then(|m| m.time.as_ref())
        .and_then(|t| t.created)
        .map(timestamp_from_millis);

    let mut messages = Vec::new();
    let mut files_changed = Vec::new();
    let mut tool_counts: HashMap<String, (u32, Vec<String>)> = HashMap::new();
    let mut estimated_tokens = 0u64;

    for oc_msg in &oc_messages {
        let role = oc_msg.role.as_deref().map(common::map_role_str).unwrap_or(Role::Assistant);
        let ts = oc_msg
            .time
            .as_ref()
            .and_then(|t| t.completed.or(t.created))
            .map(timestamp_from_millis);
        if let Some(usage) = &oc_msg.usage {
            estimated_tokens += usage.input.unwrap_or(0) + usage.output.unwrap_or(0);
        }

        let parts = load_parts(storage_dir, &oc_msg.id);
        let text = text_from_parts(&parts);
        if !text.trim().is_empty() {
            messages.push(ConversationMessage {
                role,
                content: text,
                tool_name: None,
                timestamp: ts,
                token_count: None,
            });
        }

        for part in &parts {
            if part.part_type.as_deref() != Some("tool") {
                continue;
            }
            let name = part.tool.clone().unwrap_or_else(|| "unknown".to_string());
            let input = part
                .state
                .as_ref()
                .and_then(|s| s.get("input"))
                .cloned()
                .unwrap_or(Value::Null);
            messages.push(ConversationMessage {
                role: Role::Tool,
                content: format!("{name}({input})"),
                tool_name: Some(name.clone()),
                timestamp: ts,
                token_count: None,
            });
            if let Some(path) = common::extract_path_from_args(&input) {
                let language = common::language_from_path(&path);
                files_changed.push(FileChange {
                    path,
                    change_type: ChangeType::Modified,
                    diff: None,
                    language,
                });
            }
            let entry = tool_counts.entry(name).or_insert((0, Vec::new()));
            entry.0 += 1;
            if entry.1.len() < 3 {
                entry.1.push(common::truncate(&input.to_string(), 80).to_string());
            }
        }
    }

    let message_count = messages.len();
    let tool_activity = tool_counts
        .into_iter()
        .map(|(name, (count, samples))| ToolActivitySummary { name, count, samples })
        .collect();

    Ok(CanonicalSession {
        schema_version: SCHEMA_VERSION.to_string(),
        source: Source::Opencode,
        captured_at: Utc::now(),
        session_id: meta.as_ref().map(|m| m.id.clone()).unwrap_or_else(|| session_id.to_string()),
        session_started_at: started_at,
        project: ProjectContext {
            path: meta
                .as_ref()
                .and_then(|m| m.directory.clone())
                .unwrap_or_else(common::fallback_project_path),
            name: meta.and_then(|m| m.title),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_json(path: &Path, value: &Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    #[test]
    fn assembles_session_from_fragmented_storage() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write_json(
            &root.join("session/proj1/ses_abc.json"),
            &serde_json::json!({"id": "ses_abc", "directory": "/repo", "title": "fix bug", "time": {"created": 1000.0}}),
        );
        write_json(
            &root.join("message/ses_abc/msg1.json"),
            &serde_json::json!({"id": "msg1", "role": "user", "time": {"created": 1000.0}}),
        );
        write_json(
            &root.join("part/msg1/part1.json"),
            &serde_json::json!({"type": "text", "text": "please fix the bug"}),
        );

        let session = parse_session(root, "ses_abc").unwrap();
        assert_eq!(session.session_id, "ses_abc");
        assert_eq!(session.project.path, "/repo");
        assert_eq!(session.conversation.message_count, 1);
        assert_eq!(session.conversation.messages[0].content, "please fix the bug");
    }

    #[test]
    fn sorts_messages_by_creation_time() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_json(
            &root.join("session/proj1/ses_xyz.json"),
            &serde_json::json!({"id": "ses_xyz", "directory": "/repo", "time": {"created": 1000.0}}),
        );
        write_json(
            &root.join("message/ses_xyz/msg2.json"),
            &serde_json::json!({"id": "msg2", "role": "assistant", "time": {"created": 2000.0}}),
        );
        write_json(
            &root.join("message/ses_xyz/msg1.json"),
            &serde_json::json!({"id": "msg1", "role": "user", "time": {"created": 1000.0}}),
        );
        write_json(
            &root.join("part/msg1/part1.json"),
            &serde_json::json!({"type": "text", "text": "first"}),
        );
        write_json(
            &root.join("part/msg2/part1.json"),
            &serde_json::json!({"type": "text", "text": "second"}),
        );

        let session = parse_session(root, "ses_xyz").unwrap();
        assert_eq!(session.conversation.messages[0].content, "first");
        assert_eq!(session.conversation.messages[1].content, "second");
    }
}
