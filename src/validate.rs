//! Runtime schema validation gate.
//!
//! # Architecture overview
//!
//! Every adapter's `capture` must route its assembled `CanonicalSession`
//! through `validate` before returning it to the caller. This is the single
//! place the correctness constraints on the canonical shape are checked;
//! adapters build up a record however is convenient and pay the correctness
//! cost once, here, rather than scattering defensive checks through every
//! parser.
//!
//! Validation failure is always `HandoffError::Malformed` — adapters must not
//! silently coerce an invalid record into a valid-looking one.

use std::collections::HashSet;

use crate::error::HandoffError;
use crate::model::CanonicalSession;

/// Check every constraint and return the session unchanged if they all hold,
/// or `HandoffError::Malformed` naming the first violation found.
pub fn validate(session: CanonicalSession) -> Result<CanonicalSession, HandoffError> {
    check_message_count(&session)?;
    check_message_order(&session)?;
    check_unique_file_paths(&session)?;
    check_case_insensitive_unique(&session.decisions, "decisions")?;
    check_case_insensitive_unique(&session.blockers, "blockers")?;
    check_absolute_project_path(&session)?;
    Ok(session)
}

/// `conversation.messageCount` must equal `len(conversation.messages)`.
fn check_message_count(session: &CanonicalSession) -> Result<(), HandoffError> {
    if session.conversation.message_count != session.conversation.messages.len() {
        return Err(HandoffError::Malformed(format!(
            "messageCount {} does not match {} messages",
            session.conversation.message_count,
            session.conversation.messages.len()
        )));
    }
    Ok(())
}

/// Messages are sorted non-strictly ascending by timestamp when present.
fn check_message_order(session: &CanonicalSession) -> Result<(), HandoffError> {
    let mut last = None;
    for msg in &session.conversation.messages {
        if let Some(ts) = msg.timestamp {
            if let Some(prev) = last {
                if ts < prev {
                    return Err(HandoffError::Malformed(
                        "messages are not sorted ascending by timestamp".to_string(),
                    ));
                }
            }
            last = Some(ts);
        }
    }
    Ok(())
}

/// `filesChanged` has unique paths.
fn check_unique_file_paths(session: &CanonicalSession) -> Result<(), HandoffError> {
    let mut seen = HashSet::new();
    for change in &session.files_changed {
        if !seen.insert(change.path.as_str()) {
            return Err(HandoffError::Malformed(format!(
                "duplicate path in filesChanged: {}",
                change.path
            )));
        }
    }
    Ok(())
}

/// No string in `decisions`/`blockers` repeats case-insensitively.
fn check_case_insensitive_unique(items: &[String], field: &str) -> Result<(), HandoffError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.to_lowercase()) {
            return Err(HandoffError::Malformed(format!(
                "duplicate entry in {field} (case-insensitive): {item}"
            )));
        }
    }
    Ok(())
}

/// `project.path` is absolute.
///
/// Timestamp validity is enforced structurally: every timestamp field is
/// `chrono::DateTime<Utc>`, so a malformed timestamp can never reach this
/// function — it fails to deserialize or fails to parse at the adapter
/// boundary instead, which is the Rust-idiomatic way to make a constraint
/// unrepresentable rather than re-checking it at the gate.
fn check_absolute_project_path(session: &CanonicalSession) -> Result<(), HandoffError> {
    let path = std::path::Path::new(&session.project.path);
    if !path.is_absolute() {
        return Err(HandoffError::Malformed(format!(
            "project.path is not absolute: {}",
            session.project.path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::{Duration, Utc};

    fn base_session() -> CanonicalSession {
        CanonicalSession {
            schema_version: SCHEMA_VERSION.to_string(),
            source: Source::ClaudeCode,
            captured_at: Utc::now(),
            session_id: "s1".to_string(),
            session_started_at: None,
            project: ProjectContext {
                path: "/abs/path".to_string(),
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

    #[test]
    fn valid_session_passes() {
        assert!(validate(base_session()).is_ok());
    }

    #[test]
    fn message_count_mismatch_rejected() {
        let mut s = base_session();
        s.conversation.message_count = 5;
        assert!(validate(s).is_err());
    }

    #[test]
    fn out_of_order_timestamps_rejected() {
        let mut s = base_session();
        let now = Utc::now();
        s.conversation.messages = vec![
            ConversationMessage {
                role: Role::User,
                content: "b".into(),
                tool_name: None,
                timestamp: Some(now),
                token_count: None,
            },
            ConversationMessage {
                role: Role::Assistant,
                content: "a".into(),
                tool_name: None,
                timestamp: Some(now - Duration::seconds(10)),
                token_count: None,
            },
        ];
        s.conversation.message_count = 2;
        assert!(validate(s).is_err());
    }

    #[test]
    fn duplicate_file_change_path_rejected() {
        let mut s = base_session();
        s.files_changed = vec![
            FileChange {
                path: "a.rs".into(),
                change_type: ChangeType::Modified,
                diff: None,
                language: None,
            },
            FileChange {
                path: "a.rs".into(),
                change_type: ChangeType::Deleted,
                diff: None,
                language: None,
            },
        ];
        assert!(validate(s).is_err());
    }

    #[test]
    fn case_insensitive_duplicate_decision_rejected() {
        let mut s = base_session();
        s.decisions = vec!["Use Express".to_string(), "use express".to_string()];
        assert!(validate(s).is_err());
    }

    #[test]
    fn relative_project_path_rejected() {
        let mut s = base_session();
        s.project.path = "relative/path".to_string();
        assert!(validate(s).is_err());
    }
}
