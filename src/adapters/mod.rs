//! Adapter trait and the registry of concrete adapters.
//!
//! # Architecture overview
//!
//! Widens "pick one parser for one file" into "pick one adapter per
//! installed source, each owning its own discovery, listing, and capture." A
//! `Box<dyn AgentAdapter>` per source (rather than an enum of sources) keeps
//! the adapter set open-ended: dynamic dispatch over a trait avoids an
//! ever-growing match arm anywhere that needs "do this for every adapter."
//!
//! Shared parsing rules that more than one stream-shaped adapter needs (role
//! mapping, content-block text extraction, token aliasing, file-path
//! extraction from tool arguments) live in `common` instead of being
//! duplicated across every stream adapter.

pub mod claude_code;
pub mod codex;
pub mod common;
pub mod copilot;
pub mod cursor;
pub mod droid;
pub mod gemini;
pub mod opencode;

use std::path::Path;

use crate::error::HandoffError;
use crate::model::{CanonicalSession, SessionInfo, Source};

/// The four operations every source-specific adapter implements.
pub trait AgentAdapter {
    fn source(&self) -> Source;

    /// Pure check: is this source plausibly installed on this host? Must
    /// never touch the network and must never panic — an adapter whose
    /// storage root doesn't exist simply returns `false`.
    fn detect(&self) -> bool;

    /// List sessions, most recent first (`lastActiveAt` then `startedAt`).
    /// Never fails: a session that can't be read is skipped and logged at
    /// `tracing::debug!`, not surfaced. An absent storage root yields an
    /// empty list.
    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo>;

    /// Fully normalize one session into a validated `CanonicalSession`.
    fn capture(&self, session_id: &str) -> Result<CanonicalSession, HandoffError>;

    /// Convenience: `list_sessions` then `capture` the most recent. Fails
    /// `NotFound` when the list is empty.
    fn capture_latest(&self, project_path: Option<&Path>) -> Result<CanonicalSession, HandoffError> {
        let sessions = self.list_sessions(project_path);
        let latest = sessions
            .into_iter()
            .next()
            .ok_or_else(|| HandoffError::NotFound(format!("no sessions for {}", self.source())))?;
        self.capture(&latest.id)
    }
}

/// Construct every known adapter. Order matches `Source::all()`.
pub fn all_adapters() -> Vec<Box<dyn AgentAdapter>> {
    vec![
        Box::new(claude_code::ClaudeCodeAdapter),
        Box::new(cursor::CursorAdapter),
        Box::new(codex::CodexAdapter),
        Box::new(copilot::CopilotAdapter),
        Box::new(gemini::GeminiAdapter),
        Box::new(opencode::OpenCodeAdapter),
        Box::new(droid::DroidAdapter),
    ]
}

/// Auto-select a source the way `handoff capture`/`handoff handoff` do when
/// no `--source` is given: the detected source whose most recent session has
/// the newest `lastActiveAt`; when no detected source has any sessions,
/// fall back to the first detected source.
pub fn auto_select(project_path: Option<&Path>) -> Option<Box<dyn AgentAdapter>> {
    let mut adapters: Vec<Box<dyn AgentAdapter>> =
        all_adapters().into_iter().filter(|a| a.detect()).collect();
    if adapters.is_empty() {
        return None;
    }

    let mut best_idx: Option<usize> = None;
    let mut best_time = None;
    for (idx, adapter) in adapters.iter().enumerate() {
        if let Some(info) = adapter.list_sessions(project_path).into_iter().next() {
            if best_time.is_none_or(|t| info.last_active_at > t) {
                best_time = Some(info.last_active_at);
                best_idx = Some(idx);
            }
        }
    }

    let idx = best_idx.unwrap_or(0);
    Some(adapters.swap_remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_adapters_cover_every_source() {
        let adapters = all_adapters();
        let sources: std::collections::HashSet<Source> =
            adapters.iter().map(|a| a.source()).collect();
        for src in Source::all() {
            assert!(sources.contains(src));
        }
    }
}
