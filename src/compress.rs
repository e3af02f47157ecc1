//! Compression engine: packs a `CanonicalSession` into a token budget using
//! a fixed set of priority-ordered layers. Deterministic and pure — the same
//! session and budget always produce byte-identical output.

use crate::model::{CanonicalSession, ConversationMessage, Role, Source};
use crate::registry;

/// Fixed 400-token allowance the prompt builder's header/footer consume;
/// the layers below are packed into whatever remains.
const HEADER_FOOTER_RESERVE: u64 = 400;
const CLIPBOARD_OR_FILE_BUDGET: u64 = 19_000;

/// Token estimate: `ceil(chars / 4)`, the sole measure used throughout.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

pub enum Target {
    ClipboardOrFile,
    Agent(Source),
}

/// Resolve the packing budget: an explicit `target_tokens` always wins;
/// otherwise clipboard/file gets a fixed budget and a known agent gets its
/// registry usable-budget, minus the header/footer reserve.
pub fn resolve_budget(target_tokens: Option<u64>, target: &Target) -> u64 {
    let budget = target_tokens.unwrap_or_else(|| match target {
        Target::ClipboardOrFile => CLIPBOARD_OR_FILE_BUDGET,
        Target::Agent(source) => registry::descriptor(*source).usable_budget_tokens as u64,
    });
    budget.saturating_sub(HEADER_FOOTER_RESERVE)
}

struct Layer {
    name: &'static str,
    priority: u32,
    body: String,
}

impl Layer {
    fn tokens(&self) -> u64 {
        estimate_tokens(&self.body)
    }
}

pub struct Compressed {
    pub content: String,
    pub total_tokens: u64,
    pub included_layers: Vec<String>,
    pub dropped_layers: Vec<String>,
}

fn fence(language: &Option<String>) -> &str {
    language.as_deref().unwrap_or("")
}

fn layer_task_state(session: &CanonicalSession) -> Layer {
    let task = &session.task;
    let mut body = format!("## TASK STATE\n\n**Goal:** {}\n", task.description);
    if let Some(in_progress) = &task.in_progress {
        body.push_str(&format!("\n**In progress:** {in_progress}\n"));
    }
    if !task.completed.is_empty() {
        body.push_str("\n**Completed:**\n");
        for item in &task.completed {
            body.push_str(&format!("- {item}\n"));
        }
    }
    if !task.remaining.is_empty() {
        body.push_str("\n**Remaining:**\n");
        for item in &task.remaining {
            body.push_str(&format!("- {item}\n"));
        }
    }
    if !task.blockers.is_empty() {
        body.push_str("\n**Blockers:**\n");
        for item in &task.blockers {
            body.push_str(&format!("- {item}\n"));
        }
    }
    Layer { name: "TASK STATE", priority: 1, body }
}

fn layer_active_files(session: &CanonicalSession) -> Layer {
    let mut body = String::from("## ACTIVE FILES\n");
    for change in session.files_changed.iter().take(15) {
        body.push_str(&format!("\n### {} ({:?})\n", change.path, change.change_type));
        if let Some(diff) = &change.diff {
            let truncated = crate::adapters::common::truncate(diff, 2000);
            body.push_str(&format!("```{}\n{truncated}\n```\n", fence(&change.language)));
        }
    }
    Layer { name: "ACTIVE FILES", priority: 2, body }
}

fn layer_decisions_and_blockers(session: &CanonicalSession) -> Layer {
    let mut body = String::from("## DECISIONS & BLOCKERS\n");
    if !session.decisions.is_empty() {
        body.push_str("\n**Decisions:**\n");
        for (i, decision) in session.decisions.iter().enumerate() {
            body.push_str(&format!("{}. {decision}\n", i + 1));
        }
    }
    if !session.blockers.is_empty() {
        body.push_str("\n**Blockers:**\n");
        for blocker in &session.blockers {
            body.push_str(&format!("- {blocker}\n"));
        }
    }
    Layer { name: "DECISIONS & BLOCKERS", priority: 3, body }
}

fn layer_project_context(session: &CanonicalSession) -> Layer {
    let p = &session.project;
    let mut body = format!("## PROJECT CONTEXT\n\n**Path:** {}\n", p.path);
    if let Some(name) = &p.name {
        body.push_str(&format!("**Name:** {name}\n"));
    }
    if let Some(branch) = &p.git_branch {
        body.push_str(&format!("**Branch:** {branch}\n"));
    }
    if let Some(status) = &p.git_status {
        body.push_str(&format!("\n**Status:**\n```\n{status}\n```\n"));
    }
    if let Some(tree) = &p.structure {
        body.push_str(&format!("\n**Structure:**\n```\n{tree}\n```\n"));
    }
    if let Some(memory) = &p.memory_file_contents {
        body.push_str(&format!("\n**Memory file:**\n```\n{memory}\n```\n"));
    }
    Layer { name: "PROJECT CONTEXT", priority: 4, body }
}

fn layer_tool_activity(session: &CanonicalSession) -> Layer {
    let mut body = String::from("## TOOL ACTIVITY\n\n");
    for tool in &session.tool_activity {
        body.push_str(&format!("{} (×{}): {}\n", tool.name, tool.count, tool.samples.join(" . ")));
    }
    Layer { name: "TOOL ACTIVITY", priority: 4, body }
}

fn layer_session_overview(session: &CanonicalSession) -> Layer {
    let messages = &session.conversation.messages;
    let first_user = messages.iter().find(|m| m.role == Role::User).map(|m| m.content.as_str()).unwrap_or("");
    let last_user = messages.iter().rev().find(|m| m.role == Role::User).map(|m| m.content.as_str()).unwrap_or("");
    let mut tool_names: Vec<&str> = messages.iter().filter_map(|m| m.tool_name.as_deref()).collect();
    tool_names.sort_unstable();
    tool_names.dedup();

    let body = format!(
        "## SESSION OVERVIEW\n\n- Messages: {}\n- Estimated tokens: {}\n- First user message: {}\n- Last user message: {}\n- Tools used: {}\n",
        session.conversation.message_count,
        session.conversation.estimated_tokens,
        crate::adapters::common::truncate(first_user, 200),
        crate::adapters::common::truncate(last_user, 200),
        tool_names.join(", "),
    );
    Layer { name: "SESSION OVERVIEW", priority: 5, body }
}

fn format_message(m: &ConversationMessage, max_chars: usize) -> String {
    format!("**{:?}:** {}", m.role, crate::adapters::common::truncate(&m.content, max_chars))
}

fn layer_recent_messages(session: &CanonicalSession) -> Layer {
    let messages = &session.conversation.messages;
    let start = messages.len().saturating_sub(20);
    let mut body = String::from("## RECENT MESSAGES\n\n");
    for m in &messages[start..] {
        body.push_str(&format_message(m, 1000));
        body.push('\n');
    }
    Layer { name: "RECENT MESSAGES", priority: 6, body }
}

fn layer_full_history(session: &CanonicalSession) -> Layer {
    let messages = &session.conversation.messages;
    let cutoff = messages.len().saturating_sub(20);
    let mut body = String::from("## FULL HISTORY\n\n");
    if cutoff == 0 {
        body.push_str("(no earlier messages)\n");
    } else {
        for m in &messages[..cutoff] {
            body.push_str(&format_message(m, 500));
            body.push('\n');
        }
    }
    Layer { name: "FULL HISTORY", priority: 7, body }
}

/// Pack `session`'s layers into `budget` tokens, truncating priority ≤ 3
/// layers rather than dropping them while the budget retains a useful
/// margin (> 200 tokens), and dropping priority ≥ 4 layers once they no
/// longer fit.
pub fn compress(session: &CanonicalSession, budget: u64) -> Compressed {
    let mut layers = vec![
        layer_task_state(session),
        layer_active_files(session),
        layer_decisions_and_blockers(session),
        layer_project_context(session),
        layer_tool_activity(session),
        layer_session_overview(session),
        layer_recent_messages(session),
        layer_full_history(session),
    ];
    layers.sort_by(|a, b| a.priority.cmp(&b.priority));

    let mut remaining = budget;
    let mut included = Vec::new();
    let mut dropped = Vec::new();
    let mut pieces = Vec::new();
    let mut total_tokens = 0u64;

    for layer in &layers {
        let tokens = layer.tokens();
        if tokens <= remaining {
            included.push(layer.name.to_string());
            total_tokens += tokens;
            remaining -= tokens;
            pieces.push(layer.body.clone());
        } else if layer.priority <= 3 && remaining > 200 {
            let char_budget = (remaining * 4) as usize;
            let truncated = crate::adapters::common::truncate(&layer.body, char_budget).to_string();
            total_tokens += estimate_tokens(&truncated);
            included.push(layer.name.to_string());
            pieces.push(truncated);
            remaining = 0;
        } else {
            dropped.push(layer.name.to_string());
        }
    }

    Compressed {
        content: pieces.join("\n\n"),
        total_tokens,
        included_layers: included,
        dropped_layers: dropped,
    }
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
            project: ProjectContext {
                path: "/repo".to_string(),
                ..Default::default()
            },
            conversation: Conversation {
                message_count: 2,
                estimated_tokens: 100,
                messages: vec![
                    ConversationMessage {
                        role: Role::User,
                        content: "please add tests".to_string(),
                        tool_name: None,
                        timestamp: None,
                        token_count: None,
                    },
                    ConversationMessage {
                        role: Role::Assistant,
                        content: "done".to_string(),
                        tool_name: None,
                        timestamp: None,
                        token_count: None,
                    },
                ],
            },
            files_changed: Vec::new(),
            decisions: Vec::new(),
            blockers: Vec::new(),
            task: TaskState { description: "add tests".to_string(), ..Default::default() },
            tool_activity: Vec::new(),
        }
    }

    #[test]
    fn respects_budget() {
        let session = sample_session();
        let result = compress(&session, 500);
        assert!(result.total_tokens <= 500);
        assert!(result.included_layers.contains(&"TASK STATE".to_string()));
    }

    #[test]
    fn is_deterministic() {
        let session = sample_session();
        let a = compress(&session, 500);
        let b = compress(&session, 500);
        assert_eq!(a.content, b.content);
    }

    #[test]
    fn task_state_layer_is_never_fully_dropped_with_margin() {
        let session = sample_session();
        let result = compress(&session, 10_000);
        assert!(result.included_layers.contains(&"TASK STATE".to_string()));
        assert!(result.dropped_layers.is_empty());
    }

    #[test]
    fn tiny_budget_still_includes_task_state_truncated() {
        let session = sample_session();
        let result = compress(&session, 500);
        assert!(result.included_layers.contains(&"TASK STATE".to_string()));
    }
}
