//! Resume-prompt builder: pure Markdown assembly over a `Compressed` body.
//! No I/O — everything it needs is passed in.

use crate::compress::Compressed;
use crate::model::{CanonicalSession, Source};

/// Assemble the final resume prompt: a header identifying where the session
/// came from, a fixed set of numbered resume directives, the current task
/// line, the compressed body verbatim, and a trailing imperative. When
/// `target_agent` is known, a footer names the agent the prompt is tuned for.
pub fn build(session: &CanonicalSession, compressed: &Compressed, target_agent: Option<Source>) -> String {
    let mut out = String::new();

    out.push_str("# Session Hand-off\n\n");
    out.push_str(&format!("- **Source:** {}\n", session.source.as_str()));
    out.push_str(&format!("- **Captured:** {}\n", session.captured_at.to_rfc3339()));
    out.push_str(&format!("- **Project:** {}\n", session.project.path));
    if let Some(branch) = &session.project.git_branch {
        out.push_str(&format!("- **Branch:** {branch}\n"));
    }
    if let Some(agent) = target_agent {
        out.push_str(&format!("- **Target:** {}\n", agent.as_str()));
    }
    out.push('\n');

    out.push_str("## Resuming this session\n\n");
    out.push_str("1. Read the task state below before doing anything else.\n");
    out.push_str("2. Treat the active files section as the current state of the repo, not a proposal.\n");
    out.push_str("3. Do not re-ask questions already answered in decisions & blockers.\n");
    out.push_str("4. Continue from the most recent message, not from the beginning.\n");
    out.push_str("5. If a blocker below is still unresolved, address it before moving on to remaining work.\n");
    out.push_str("6. Preserve the project's existing conventions visible in the active files.\n\n");

    out.push_str(&current_task_section(session));

    out.push_str(&compressed.content);
    out.push_str("\n\n");

    out.push_str("---\n\nPick up this session now. Do not summarize this hand-off back to the user; act on it.\n");

    if !compressed.dropped_layers.is_empty() {
        out.push_str(&format!(
            "\n_Dropped for budget: {}_\n",
            compressed.dropped_layers.join(", ")
        ));
    }

    out
}

/// Render the "## Current task" section: the goal plus in-progress/
/// completed/remaining, the same fields `compress.rs`'s TASK STATE layer
/// carries, so a reader of just this section still has that context even if
/// the compressed body's TASK STATE layer was dropped for budget.
fn current_task_section(session: &CanonicalSession) -> String {
    let task = &session.task;
    let mut out = format!("## Current task\n\n{}\n", task.description);
    if let Some(in_progress) = &task.in_progress {
        out.push_str(&format!("\n**In progress:** {in_progress}\n"));
    }
    if !task.completed.is_empty() {
        out.push_str("\n**Completed:**\n");
        for item in &task.completed {
            out.push_str(&format!("- {item}\n"));
        }
    }
    if !task.remaining.is_empty() {
        out.push_str("\n**Remaining:**\n");
        for item in &task.remaining {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::Utc;

    fn sample_session() -> CanonicalSession {
        CanonicalSession {
            schema_version: SCHEMA_VERSION.to_string(),
            source: Source::ClaudeCode,
            captured_at: Utc::now(),
            session_id: "s1".to_string(),
            session_started_at: None,
            project: ProjectContext { path: "/repo".to_string(), ..Default::default() },
            conversation: Conversation { message_count: 0, estimated_tokens: 0, messages: Vec::new() },
            files_changed: Vec::new(),
            decisions: Vec::new(),
            blockers: Vec::new(),
            task: TaskState { description: "add tests".to_string(), ..Default::default() },
            tool_activity: Vec::new(),
        }
    }

    #[test]
    fn includes_source_and_task() {
        let session = sample_session();
        let compressed = Compressed {
            content: "body".to_string(),
            total_tokens: 10,
            included_layers: vec!["TASK STATE".to_string()],
            dropped_layers: Vec::new(),
        };
        let prompt = build(&session, &compressed, None);
        assert!(prompt.contains("claude-code"));
        assert!(prompt.contains("add tests"));
        assert!(prompt.contains("body"));
        assert!(!prompt.contains("Dropped for budget"));
    }

    #[test]
    fn notes_dropped_layers() {
        let session = sample_session();
        let compressed = Compressed {
            content: "body".to_string(),
            total_tokens: 10,
            included_layers: vec!["TASK STATE".to_string()],
            dropped_layers: vec!["FULL HISTORY".to_string()],
        };
        let prompt = build(&session, &compressed, Some(Source::Cursor));
        assert!(prompt.contains("Dropped for budget: FULL HISTORY"));
        assert!(prompt.contains("cursor"));
    }

    #[test]
    fn current_task_section_carries_progress_fields() {
        let mut session = sample_session();
        session.task = TaskState {
            description: "add tests".to_string(),
            in_progress: Some("writing watcher tests".to_string()),
            completed: vec!["wrote compress tests".to_string()],
            remaining: vec!["wire CI".to_string()],
            blockers: Vec::new(),
        };
        let compressed = Compressed {
            content: "body".to_string(),
            total_tokens: 10,
            included_layers: vec!["TASK STATE".to_string()],
            dropped_layers: Vec::new(),
        };
        let prompt = build(&session, &compressed, None);
        assert!(prompt.contains("writing watcher tests"));
        assert!(prompt.contains("wrote compress tests"));
        assert!(prompt.contains("wire CI"));
    }
}
