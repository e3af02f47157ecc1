//! Droid adapter: append-only JSONL session files under
//! `~/.factory/sessions`. Droid's on-disk record shape is the same generic
//! line-oriented contract as Copilot and Gemini, so parsing is delegated to
//! `adapters::common`.

use std::path::Path;

use crate::adapters::common;
use crate::adapters::AgentAdapter;
use crate::error::HandoffError;
use crate::model::{CanonicalSession, SessionInfo, Source};
use crate::registry;

pub struct DroidAdapter;

impl AgentAdapter for DroidAdapter {
    fn source(&self) -> Source {
        Source::Droid
    }

    fn detect(&self) -> bool {
        registry::descriptor(Source::Droid).storage_root().is_some_and(|p| p.exists())
    }

    fn list_sessions(&self, project_path: Option<&Path>) -> Vec<SessionInfo> {
        common::list_generic_sessions(Source::Droid, project_path)
    }

    fn capture(&self, session_id: &str) -> Result<CanonicalSession, HandoffError> {
        common::capture_generic(Source::Droid, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_is_false_when_storage_root_absent() {
        if registry::descriptor(Source::Droid).storage_root().is_some_and(|p| p.exists()) {
            return;
        }
        assert!(!DroidAdapter.detect());
    }
}
