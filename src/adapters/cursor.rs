//! Cursor adapter: sessions live in per-workspace SQLite databases, plus one
//! global database, under `.../Cursor/User/workspaceStorage` and
//! `.../Cursor/User/globalStorage`.
//!
//! Every database is opened read-only with "must already exist" semantics —
//! Cursor itself must have created it. A lock held by a running Cursor
//! instance surfaces as `HandoffError::Locked` with no retry.

use std::path::{Path, PathBuf};

use chrono::TimeZone;
use md5::Md5;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::adapters::common;
use crate::adapters::AgentAdapter;
use crate::error::HandoffError;
use crate::model::*;
use crate::registry;
use crate::validate;

pub struct CursorAdapter;

impl AgentAdapter for CursorAdapter {
    fn source(&self) -> Source {
        Source::Cursor
    }

    fn detect(&self) -> bool {
        workspace_storage_root().is_some()
    }

    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo> {
        let Some(root) = workspace_storage_root() else {
            return Vec::new();
        };

        let workspaces = match project_path {
            Some(target) => resolve_workspaces_for_path(&root, target),
            None => all_workspace_dirs(&root),
        };

        let mut infos = Vec::new();
        let mut seen_composer_ids = std::collections::HashSet::new();
        for workspace in &workspaces {
            let Ok(conn) = open_readonly(&workspace.join("state.vscdb")) else {
                continue;
            };
            let Some(manifest) = read_manifest(&conn) else { continue };
            let hash = workspace.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            for entry in manifest.composers {
                seen_composer_ids.insert(entry.id.clone());
                infos.push(SessionInfo {
                    id: format!("{hash}:{}", entry.id),
                    started_at: None,
                    last_active_at: entry.last_updated_at(),
                    message_count: entry.message_count.unwrap_or(0),
                    project_path: read_workspace_json(workspace).or_else(|| project_path.map(|p| p.display().to_string())),
                    preview: SessionInfo::truncated_preview(&entry.name.unwrap_or_default(), 200),
                });
            }
        }

        // Global-only sessions: those not already represented by any workspace.
        if let Some(global_root) = global_storage_root() {
            if let Ok(conn) = open_readonly(&global_root.join("state.vscdb")) {
                if let Some(manifest) = read_global_manifest(&conn) {
                    for entry in manifest.composers {
                        if seen_composer_ids.contains(&entry.id) {
                            continue;
                        }
                        infos.push(SessionInfo {
                            id: format!("global:{}", entry.id),
                            started_at: None,
                            last_active_at: entry.last_updated_at(),
                            message_count: entry.message_count.unwrap_or(0),
                            project_path: None,
                            preview: SessionInfo::truncated_preview(&entry.name.unwrap_or_default(), 200),
                        });
                    }
                }
            }
        }

        infos.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        infos
    }

    fn capture(&self, session_id: &str) -> Result<CanonicalSession, HandoffError> {
        let Some((workspace_ref, composer_id)) = session_id.split_once(':') else {
            return Err(HandoffError::Malformed(format!("invalid cursor session id: {session_id}")));
        };

        let bubbles = if workspace_ref == "global" {
            let global_root = global_storage_root()
                .ok_or_else(|| HandoffError::NotFound("no sessions for cursor".to_string()))?;
            let conn = open_readonly(&global_root.join("state.vscdb"))?;
            read_bubbles(&conn, "cursorDiskKV", composer_id)
        } else {
            let root = workspace_storage_root()
                .ok_or_else(|| HandoffError::NotFound("no sessions for cursor".to_string()))?;
            let workspace_dir = root.join(workspace_ref);
            let conn = open_readonly(&workspace_dir.join("state.vscdb"))?;
            let mut bubbles = read_bubbles(&conn, "ItemTable", composer_id);
            if bubbles.is_empty() {
                bubbles = read_embedded_manifest_messages(&conn, composer_id);
            }
            if bubbles.is_empty() {
                bubbles = read_legacy_manifest_messages(&conn, composer_id);
            }
            if bubbles.is_empty() {
                if let Some(global_root) = global_storage_root() {
                    if let Ok(global_conn) = open_readonly(&global_root.join("state.vscdb")) {
                        bubbles = read_bubbles(&global_conn, "cursorDiskKV", composer_id);
                    }
                }
            }
            bubbles
        };

        if bubbles.is_empty() {
            return Err(HandoffError::NotFound(format!("no session {session_id} for cursor")));
        }

        let project_path = if workspace_ref != "global" {
            workspace_storage_root().and_then(|r| read_workspace_json(&r.join(workspace_ref)))
        } else {
            None
        };

        let session = build_session(composer_id, bubbles, project_path);
        validate::validate(session)
    }
}

fn workspace_storage_root() -> Option<PathBuf> {
    registry::descriptor(Source::Cursor).storage_root().filter(|p| p.exists())
}

fn global_storage_root() -> Option<PathBuf> {
    workspace_storage_root()?.parent().map(|p| p.join("globalStorage")).filter(|p| p.exists())
}

fn all_workspace_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect()
}

/// `listSessions(projectPath)` resolution order: exact match via
/// `workspace.json`, then multi-hash path-variant matching, then (if
/// neither yields a candidate) the most recently modified database.
fn resolve_workspaces_for_path(root: &Path, target: &Path) -> Vec<PathBuf> {
    let dirs = all_workspace_dirs(root);

    let exact: Vec<PathBuf> = dirs
        .iter()
        .filter(|d| read_workspace_json(d).as_deref() == target.to_str())
        .cloned()
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let target_str = target.to_string_lossy();
    let digests = path_digests(&target_str);
    let hashed: Vec<PathBuf> = dirs
        .iter()
        .filter(|d| {
            d.file_name()
                .map(|n| digests.contains(&n.to_string_lossy().to_string()))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    if !hashed.is_empty() {
        return hashed;
    }

    dirs.into_iter()
        .filter_map(|d| {
            let db = d.join("state.vscdb");
            std::fs::metadata(&db).ok().and_then(|m| m.modified().ok()).map(|m| (d, m))
        })
        .max_by_key(|(_, m)| *m)
        .map(|(d, _)| vec![d])
        .unwrap_or_default()
}

/// md5/sha1/sha256 of the path, plus the same digests of a trailing-slash
/// variant, since Cursor's hash input convention is not externally
/// documented and varies across path-normalization choices.
fn path_digests(path: &str) -> Vec<String> {
    let variants = [path.to_string(), format!("{path}/")];
    let mut digests = Vec::new();
    for v in variants {
        digests.push(hex::encode(md5_digest(v.as_bytes())));
        digests.push(hex::encode(Sha1::digest(v.as_bytes())));
        digests.push(hex::encode(Sha256::digest(v.as_bytes())));
    }
    digests
}

fn md5_digest(bytes: &[u8]) -> Vec<u8> {
    use md5::Digest as _;
    Md5::digest(bytes).to_vec()
}

/// Decode `workspace.json`'s `folder` field: a `file://` URI, percent-decoded,
/// with the leading `/` stripped when it prefixes a windows-like drive letter.
fn read_workspace_json(workspace_dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(workspace_dir.join("workspace.json")).ok()?;
    let value: Value = serde_json::from_str(&raw).ok()?;
    let uri = value.get("folder").and_then(|v| v.as_str())?;
    let path = uri.strip_prefix("file://")?;
    let decoded = percent_decode(path);
    if decoded.len() > 2 && decoded.as_bytes()[0] == b'/' && decoded.as_bytes()[2] == b':' {
        Some(decoded[1..].to_string())
    } else {
        Some(decoded)
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

fn open_readonly(path: &Path) -> Result<Connection, HandoffError> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("locked") || msg.contains("unable to open") {
            HandoffError::Locked { source: "Cursor".to_string() }
        } else {
            HandoffError::Sqlite(msg)
        }
    })
}

fn read_item_table_value(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM ItemTable WHERE key = ?1", [key], |row| row.get(0)).ok()
}

fn read_kv_value(conn: &Connection, table: &str, key: &str) -> Option<String> {
    conn.query_row(&format!("SELECT value FROM {table} WHERE key = ?1"), [key], |row| row.get(0)).ok()
}

struct ComposerEntry {
    id: String,
    name: Option<String>,
    last_updated_at: Option<i64>,
    message_count: Option<usize>,
}

impl ComposerEntry {
    fn last_updated_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.last_updated_at
            .and_then(|ms| chrono::Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(chrono::Utc::now)
    }
}

struct Manifest {
    composers: Vec<ComposerEntry>,
}

#[derive(Deserialize)]
struct RawComposer {
    #[serde(rename = "composerId")]
    composer_id: String,
    name: Option<String>,
    #[serde(rename = "lastUpdatedAt")]
    last_updated_at: Option<i64>,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(rename = "allComposers", default)]
    all_composers: Vec<RawComposer>,
}

/// Read a workspace manifest under the modern key, falling back to the
/// legacy key.
fn read_manifest(conn: &Connection) -> Option<Manifest> {
    let raw = read_item_table_value(conn, "composer.composerData")
        .or_else(|| read_item_table_value(conn, "workbench.panel.aichat.view.aichat.chatdata"))?;
    parse_manifest(&raw)
}

fn read_global_manifest(conn: &Connection) -> Option<Manifest> {
    let raw = read_kv_value(conn, "cursorDiskKV", "composer.composerData")?;
    parse_manifest(&raw)
}

fn parse_manifest(raw: &str) -> Option<Manifest> {
    let parsed: RawManifest = serde_json::from_str(raw).ok()?;
    Some(Manifest {
        composers: parsed
            .all_composers
            .into_iter()
            .map(|c| ComposerEntry {
                id: c.composer_id,
                name: c.name,
                last_updated_at: c.last_updated_at,
                message_count: None,
            })
            .collect(),
    })
}

/// A `bubbleId:<sessionId>:<bubbleId>` row's payload.
#[derive(Deserialize)]
struct Bubble {
    #[serde(rename = "type")]
    bubble_type: Option<Value>,
    text: Option<String>,
    #[serde(rename = "richText")]
    rich_text: Option<String>,
    content: Option<Value>,
    message: Option<Value>,
}

fn bubble_text(bubble: &Bubble) -> String {
    if let Some(content) = &bubble.content {
        let text = common::extract_text_content(content);
        if !text.trim().is_empty() {
            return text;
        }
    }
    if let Some(text) = &bubble.text {
        if !text.trim().is_empty() {
            return text.clone();
        }
    }
    if let Some(rich) = &bubble.rich_text {
        if !rich.trim().is_empty() {
            return rich.clone();
        }
    }
    if let Some(message) = &bubble.message {
        if let Some(content) = message.get("content") {
            return common::extract_text_content(content);
        }
    }
    String::new()
}

fn bubble_role(bubble: &Bubble) -> Role {
    match &bubble.bubble_type {
        Some(Value::String(s)) => common::map_role_str(s),
        Some(Value::Number(n)) => n.as_i64().map(common::map_role_numeric).unwrap_or(Role::Assistant),
        _ => Role::Assistant,
    }
}

/// Scan every `bubbleId:<composerId>:*` row in `table`, in key order.
fn read_bubbles(conn: &Connection, table: &str, composer_id: &str) -> Vec<Bubble> {
    let prefix = format!("bubbleId:{composer_id}:%");
    let query = format!("SELECT value FROM {table} WHERE key LIKE ?1 ORDER BY key");
    let Ok(mut stmt) = conn.prepare(&query) else { return Vec::new() };
    let Ok(rows) = stmt.query_map([&prefix], |row| row.get::<_, String>(0)) else {
        return Vec::new();
    };
    rows.filter_map(|r| r.ok())
        .filter_map(|raw| serde_json::from_str::<Bubble>(&raw).ok())
        .collect()
}

/// Fall back to messages embedded directly in the composer manifest entry,
/// for older Cursor versions that never wrote per-bubble rows.
fn read_embedded_manifest_messages(conn: &Connection, composer_id: &str) -> Vec<Bubble> {
    let Some(raw) = read_item_table_value(conn, &format!("composerData:{composer_id}")) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<Value>(&raw) else {
        return Vec::new();
    };
    let Some(messages) = value.get("conversation").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    messages
        .iter()
        .filter_map(|m| serde_json::from_value::<Bubble>(m.clone()).ok())
        .collect()
}

#[derive(Deserialize)]
struct LegacyManifest {
    #[serde(default)]
    tabs: Vec<LegacyTab>,
}

#[derive(Deserialize)]
struct LegacyTab {
    #[serde(rename = "tabId")]
    tab_id: String,
    #[serde(default)]
    bubbles: Vec<Value>,
}

/// Read this composer's embedded conversation from the legacy
/// `workbench.panel.aichat.view.aichat.chatdata` key — the format Cursor
/// used before composers moved to their own `composerData:<id>` rows, where
/// each tab carried its bubbles inline rather than pointing at a separate
/// key.
fn read_legacy_manifest_messages(conn: &Connection, composer_id: &str) -> Vec<Bubble> {
    let Some(raw) = read_item_table_value(conn, "workbench.panel.aichat.view.aichat.chatdata") else {
        return Vec::new();
    };
    let Ok(manifest) = serde_json::from_str::<LegacyManifest>(&raw) else {
        return Vec::new();
    };
    manifest
        .tabs
        .into_iter()
        .find(|t| t.tab_id == composer_id)
        .map(|t| t.bubbles.into_iter().filter_map(|b| serde_json::from_value::<Bubble>(b).ok()).collect())
        .unwrap_or_default()
}

fn build_session(composer_id: &str, bubbles: Vec<Bubble>, project_path: Option<String>) -> CanonicalSession {
    let messages: Vec<ConversationMessage> = bubbles
        .iter()
        .map(|b| {
            let text = bubble_text(b);
            ConversationMessage {
                role: bubble_role(b),
                content: text,
                tool_name: None,
                timestamp: None,
                token_count: None,
            }
        })
        .filter(|m| !m.content.trim().is_empty())
        .collect();

    let message_count = messages.len();
    CanonicalSession {
        schema_version: SCHEMA_VERSION.to_string(),
        source: Source::Cursor,
        captured_at: chrono::Utc::now(),
        session_id: composer_id.to_string(),
        session_started_at: None,
        project: ProjectContext {
            path: project_path.unwrap_or_else(common::fallback_project_path),
            ..Default::default()
        },
        conversation: Conversation {
            message_count,
            estimated_tokens: 0,
            messages,
        },
        files_changed: Vec::new(),
        decisions: Vec::new(),
        blockers: Vec::new(),
        task: TaskState::default(),
        tool_activity: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_decode_handles_spaces_and_letters() {
        assert_eq!(percent_decode("/Users/me/My%20Project"), "/Users/me/My Project");
    }

    #[test]
    fn bubble_text_prefers_content_over_text() {
        let bubble = Bubble {
            bubble_type: Some(Value::String("ai".to_string())),
            text: Some("fallback".to_string()),
            rich_text: None,
            content: Some(serde_json::json!("preferred")),
            message: None,
        };
        assert_eq!(bubble_text(&bubble), "preferred");
        assert_eq!(bubble_role(&bubble), Role::Assistant);
    }

    #[test]
    fn path_digests_are_stable_and_nonempty() {
        let digests = path_digests("/repo");
        assert_eq!(digests.len(), 6);
        assert_eq!(digests, path_digests("/repo"));
    }

    #[test]
    fn legacy_manifest_parses_tabs_and_filters_by_id() {
        let raw = serde_json::json!({
            "tabs": [
                { "tabId": "other", "bubbles": [{ "type": "user", "text": "hi" }] },
                { "tabId": "c1", "bubbles": [{ "type": "ai", "text": "done" }] },
            ]
        });
        let manifest: LegacyManifest = serde_json::from_value(raw).unwrap();
        let tab = manifest.tabs.into_iter().find(|t| t.tab_id == "c1").unwrap();
        let bubbles: Vec<Bubble> = tab.bubbles.into_iter().filter_map(|b| serde_json::from_value(b).ok()).collect();
        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubble_text(&bubbles[0]), "done");
    }
}
