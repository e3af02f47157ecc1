//! GitHub Copilot adapter: append-only JSONL session files under the VS
//! Code workspace storage tree. Treated as the same generic line-oriented
//! stream contract as droid and gemini (grounded on the dominant JSONL shape
//! across the reference pack — see DESIGN.md's Open Question entry).

use std::path::Path;

use crate::adapters::common;
use crate::adapters::AgentAdapter;
use crate::error::HandoffError;
use crate::model::{CanonicalSession, SessionInfo, Source};
use crate::registry;

pub struct CopilotAdapter;

impl AgentAdapter for CopilotAdapter {
    fn source(&self) -> Source {
        Source::Copilot
    }

    fn detect(&self) -> bool {
        registry::descriptor(Source::Copilot).storage_root().is_some_and(|p| p.exists())
    }

    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo> {
        common::list_generic_sessions(Source::Copilot, project_path)
    }

    fn capture(&self, session_id: &str) -> Result<CanonicalSession, HandoffError> {
        common::capture_generic(Source::Copilot, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_is_false_when_storage_root_absent() {
        if registry::descriptor(Source::Copilot).storage_root().is_some_and(|p| p.exists()) {
            return;
        }
        assert!(!CopilotAdapter.detect());
    }
}
