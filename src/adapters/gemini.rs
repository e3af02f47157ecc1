//! Gemini CLI adapter: append-only JSONL session files under
//! `~/.gemini/sessions`. Treated as the same generic line-oriented stream
//! contract as droid and copilot (see DESIGN.md's Open Question entry).

use std::path::Path;

use crate::adapters::common;
use crate::adapters::AgentAdapter;
use crate::error::HandoffError;
use crate::model::{CanonicalSession, SessionInfo, Source};
use crate::registry;

pub struct GeminiAdapter;

impl AgentAdapter for GeminiAdapter {
    fn source(&self) -> Source {
        Source::Gemini
    }

    fn detect(&self) -> bool {
        registry::descriptor(Source::Gemini).storage_root().is_some_and(|p| p.exists())
    }

    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo> {
        common::list_generic_sessions(Source::Gemini, project_path)
    }

    fn capture(&self, session_id: &str) -> Result<CanonicalSession, HandoffError> {
        common::capture_generic(Source::Gemini, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_is_false_when_storage_root_absent() {
        if registry::descriptor(Source::Gemini).storage_root().is_some_and(|p| p.exists()) {
            return;
        }
        assert!(!GeminiAdapter.detect());
    }
}
