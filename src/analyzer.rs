//! Conversation analyzer: derives `taskDescription`, `decisions`, `blockers`,
//! and `completedSteps` from a normalized message list. A pure function —
//! no I/O, deterministic, and the only place these heuristics live so the
//! adapters themselves stay focused on normalization.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{ConversationMessage, Role, TaskState};

const ACKNOWLEDGEMENTS: &[&str] = &[
    "yes", "ok", "okay", "sure", "continue", "go ahead", "proceed", "sounds good", "do it", "yep", "yeah",
];

static INTERRUPTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)interrupted").unwrap());

static DECISION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bI'll (use|choose|pick)\b",
        r"(?i)\blet's (use|go with)\b",
        r"(?i)\bdecided to\b",
        r"(?i)\bchoosing .+ over .+",
        r"(?i)\bbetter to use\b",
        r"(?i)\bis better than\b",
        r"(?i)\busing .+ for\b",
        r"(?i)\bpicked .+ because\b",
        r"(?i)\binstead of\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const BLOCKER_MARKERS: &[&str] = &[
    "error",
    "failed",
    "unable to",
    "can't",
    "cannot",
    "permission denied",
    "not found",
    "404",
    "500",
    "timeout",
    "econnrefused",
];

static STACK_FRAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^at \S+").unwrap());

const COMPLETION_VERBS: &[&str] = &[
    "done", "completed", "finished", "created", "added", "updated", "fixed", "implemented", "resolved",
    "configured", "refactored", "verified",
];

const FUTURE_TENSE_MARKERS: &[&str] = &["i'll", "i will", "we'll", "going to"];

/// Split on sentence-ending punctuation, keeping non-empty trimmed pieces.
fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_meaningful(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.chars().count() < 15 {
        return false;
    }
    if trimmed.starts_with('[') {
        return false;
    }
    let normalized = trimmed.trim_end_matches(['.', '!', '?']).to_lowercase();
    if ACKNOWLEDGEMENTS.contains(&normalized.as_str()) {
        return false;
    }
    if INTERRUPTED_RE.is_match(trimmed) {
        return false;
    }
    true
}

fn truncate_chars(s: &str, max: usize, ellipsis: bool) -> String {
    let mut result: String = s.chars().take(max).collect();
    if ellipsis && s.chars().count() > max {
        result.push('…');
    }
    result
}

fn task_description(messages: &[ConversationMessage]) -> String {
    let first_user = messages.iter().find(|m| m.role == Role::User && is_meaningful(&m.content));
    if let Some(m) = first_user {
        return truncate_chars(m.content.trim(), 300, true);
    }
    let first_assistant = messages.iter().find(|m| m.role == Role::Assistant && is_meaningful(&m.content));
    if let Some(m) = first_assistant {
        return truncate_chars(m.content.trim(), 300, true);
    }
    "Unknown task".to_string()
}

fn dedup_case_insensitive(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.to_lowercase()) {
            out.push(item);
            if out.len() >= cap {
                break;
            }
        }
    }
    out
}

fn normalize_decision(sentence: &str) -> String {
    sentence.trim().trim_start_matches(['-', '*', '•']).trim().to_string()
}

fn decisions(messages: &[ConversationMessage]) -> Vec<String> {
    let mut found = Vec::new();
    for message in messages.iter().filter(|m| m.role == Role::Assistant) {
        for sentence in sentences(&message.content) {
            if DECISION_RES.iter().any(|re| re.is_match(sentence)) {
                found.push(normalize_decision(sentence));
            }
        }
    }
    dedup_case_insensitive(found, 10)
}

fn canonicalize_blocker(line: &str) -> String {
    let trimmed = line.trim();
    if STACK_FRAME_RE.is_match(trimmed) {
        return format!("Stack trace: {trimmed}");
    }
    let lower = trimmed.to_lowercase();
    if let Some(idx) = lower.find("error") {
        let rest = &trimmed[idx + "error".len()..];
        let rest = rest.trim_start_matches(':').trim();
        return format!("Error: {rest}");
    }
    if lower.contains("failed") {
        return format!("Failed: {trimmed}");
    }
    trimmed.to_string()
}

fn blockers(messages: &[ConversationMessage]) -> Vec<String> {
    let mut found = Vec::new();
    for message in messages {
        for line in message.content.lines() {
            let lower = line.to_lowercase();
            let matches = BLOCKER_MARKERS.iter().any(|marker| lower.contains(marker)) || STACK_FRAME_RE.is_match(line.trim());
            if matches {
                found.push(truncate_chars(&canonicalize_blocker(line), 160, false));
            }
        }
    }
    dedup_case_insensitive(found, 10)
}

fn completed_steps(messages: &[ConversationMessage]) -> Vec<String> {
    let mut found = Vec::new();
    for message in messages.iter().filter(|m| m.role == Role::Assistant) {
        for sentence in sentences(&message.content) {
            let lower = sentence.to_lowercase();
            let has_completion = COMPLETION_VERBS.iter().any(|v| lower.contains(v));
            let has_future = FUTURE_TENSE_MARKERS.iter().any(|v| lower.contains(v));
            if has_completion && !has_future {
                found.push(truncate_chars(sentence.trim(), 100, false));
            }
        }
    }
    dedup_case_insensitive(found, 15)
}

/// Run every extraction rule over `messages` and assemble the resulting
/// `TaskState`. `completed`/`remaining`/`inProgress` beyond `completedSteps`
/// are left for the caller to populate (this crate has no notion of a todo
/// list distinct from the conversation itself).
pub fn analyze(messages: &[ConversationMessage]) -> TaskState {
    TaskState {
        description: task_description(messages),
        completed: completed_steps(messages),
        remaining: Vec::new(),
        in_progress: None,
        blockers: blockers(messages),
    }
}

pub fn decisions_and_blockers(messages: &[ConversationMessage]) -> (Vec<String>, Vec<String>) {
    (decisions(messages), blockers(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> ConversationMessage {
        ConversationMessage {
            role,
            content: content.to_string(),
            tool_name: None,
            timestamp: None,
            token_count: None,
        }
    }

    #[test]
    fn picks_first_meaningful_user_message() {
        let messages = vec![
            msg(Role::User, "[Request interrupted]"),
            msg(Role::User, "yes"),
            msg(Role::User, "Build a resilient auth API with refresh token rotation."),
        ];
        assert_eq!(
            task_description(&messages),
            "Build a resilient auth API with refresh token rotation."
        );
    }

    #[test]
    fn falls_back_to_unknown_task() {
        let messages = vec![msg(Role::System, "irrelevant system note")];
        assert_eq!(task_description(&messages), "Unknown task");
    }

    #[test]
    fn extracts_decision_with_instead_of() {
        let messages = vec![msg(
            Role::Assistant,
            "I'll use Express instead of Fastify because middleware support is better",
        )];
        let found = decisions(&messages);
        assert!(found.iter().any(|d| d.contains("Express instead of Fastify")));
    }

    #[test]
    fn extracts_econnrefused_blocker() {
        let messages = vec![msg(Role::User, "Error: ECONNREFUSED 127.0.0.1:5432")];
        let found = blockers(&messages);
        assert!(found.iter().any(|b| b == "Error: ECONNREFUSED 127.0.0.1:5432"));
    }

    #[test]
    fn completed_steps_exclude_future_tense() {
        let messages = vec![
            msg(Role::Assistant, "I fixed the login bug"),
            msg(Role::Assistant, "I'll fix the signup bug next"),
        ];
        let steps = completed_steps(&messages);
        assert!(steps.iter().any(|s| s.contains("fixed the login bug")));
        assert!(!steps.iter().any(|s| s.contains("signup bug next")));
    }

    #[test]
    fn decisions_and_blockers_are_capped_and_deduped() {
        let messages: Vec<_> = (0..20)
            .map(|_| msg(Role::Assistant, "I'll use React instead of Vue for this."))
            .collect();
        let found = decisions(&messages);
        assert_eq!(found.len(), 1);
    }
}
