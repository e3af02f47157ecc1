//! Per-source registry: storage paths, context windows, usable budgets.
//!
//! # Architecture overview
//!
//! Generalizes a per-tool match arm returning one path into a `const` table
//! covering all seven sources across three host-OS families, plus the
//! metadata `info` prints (context window, usable budget, memory files).
//!
//! Keeping this as a flat data table rather than a method on each adapter
//! means `info` and path discovery share one source of truth: an adapter's
//! `detect()` and the registry's `storage_root()` must always agree about
//! where a source's data lives.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFamily {
    Darwin,
    Linux,
    Windows,
}

pub fn host_family() -> HostFamily {
    if cfg!(target_os = "macos") {
        HostFamily::Darwin
    } else if cfg!(target_os = "windows") {
        HostFamily::Windows
    } else {
        HostFamily::Linux
    }
}

/// True when running on a linux-like host under WSL (a Windows user directory
/// mount is additionally searched as a fallback).
pub fn is_wsl() -> bool {
    if host_family() != HostFamily::Linux {
        return false;
    }
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy)]
pub struct SourceDescriptor {
    pub id: crate::model::Source,
    pub display_name: &'static str,
    /// Path relative to `$HOME`, per host family. `None` means the source has
    /// no storage root on that host family.
    pub darwin_path: Option<&'static str>,
    pub linux_path: Option<&'static str>,
    pub windows_path: Option<&'static str>,
    pub context_window_tokens: u32,
    pub usable_budget_tokens: u32,
    pub memory_files: &'static [&'static str],
}

use crate::model::Source;

pub const REGISTRY: &[SourceDescriptor] = &[
    SourceDescriptor {
        id: Source::ClaudeCode,
        display_name: "Claude Code",
        darwin_path: Some(".claude/projects"),
        linux_path: Some(".claude/projects"),
        windows_path: Some(".claude/projects"),
        context_window_tokens: 200_000,
        usable_budget_tokens: 120_000,
        memory_files: &["CLAUDE.md", ".claude/CLAUDE.md"],
    },
    SourceDescriptor {
        id: Source::Cursor,
        display_name: "Cursor",
        darwin_path: Some("Library/Application Support/Cursor/User/workspaceStorage"),
        linux_path: Some(".config/Cursor/User/workspaceStorage"),
        windows_path: Some("AppData/Roaming/Cursor/User/workspaceStorage"),
        context_window_tokens: 128_000,
        usable_budget_tokens: 80_000,
        memory_files: &[".cursorrules", ".cursor/rules"],
    },
    SourceDescriptor {
        id: Source::Codex,
        display_name: "Codex",
        darwin_path: Some(".codex/sessions"),
        linux_path: Some(".codex/sessions"),
        windows_path: Some(".codex/sessions"),
        context_window_tokens: 128_000,
        usable_budget_tokens: 80_000,
        memory_files: &["AGENTS.md"],
    },
    SourceDescriptor {
        id: Source::Copilot,
        display_name: "GitHub Copilot",
        darwin_path: Some("Library/Application Support/Code/User/workspaceStorage"),
        linux_path: Some(".config/Code/User/workspaceStorage"),
        windows_path: Some("AppData/Roaming/Code/User/workspaceStorage"),
        context_window_tokens: 128_000,
        usable_budget_tokens: 80_000,
        memory_files: &[".github/copilot-instructions.md"],
    },
    SourceDescriptor {
        id: Source::Gemini,
        display_name: "Gemini CLI",
        darwin_path: Some(".gemini/sessions"),
        linux_path: Some(".gemini/sessions"),
        windows_path: Some(".gemini/sessions"),
        context_window_tokens: 1_000_000,
        usable_budget_tokens: 120_000,
        memory_files: &["GEMINI.md"],
    },
    SourceDescriptor {
        id: Source::Opencode,
        display_name: "OpenCode",
        darwin_path: Some(".local/share/opencode/storage"),
        linux_path: Some(".local/share/opencode/storage"),
        windows_path: Some("AppData/Local/opencode/storage"),
        context_window_tokens: 128_000,
        usable_budget_tokens: 80_000,
        memory_files: &["AGENTS.md", ".opencode/AGENTS.md"],
    },
    SourceDescriptor {
        id: Source::Droid,
        display_name: "Droid",
        darwin_path: Some(".factory/sessions"),
        linux_path: Some(".factory/sessions"),
        windows_path: Some(".factory/sessions"),
        context_window_tokens: 128_000,
        usable_budget_tokens: 80_000,
        memory_files: &["AGENTS.md"],
    },
];

pub fn descriptor(source: Source) -> &'static SourceDescriptor {
    REGISTRY
        .iter()
        .find(|d| d.id == source)
        .expect("registry covers every Source variant")
}

impl SourceDescriptor {
    /// Relative (to `$HOME`) storage path for the current host family, or
    /// `None` when this source has no storage root on this host.
    fn relative_path(&self) -> Option<&'static str> {
        match host_family() {
            HostFamily::Darwin => self.darwin_path,
            HostFamily::Linux => self.linux_path,
            HostFamily::Windows => self.windows_path,
        }
    }

    /// Resolve the storage root for the current host, or `None` if this
    /// source has no storage root on this host or `$HOME` can't be found.
    /// Missing storage roots never raise — callers treat `None` the same as
    /// an uninstalled source.
    pub fn storage_root(&self) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let rel = self.relative_path()?;
        Some(home.join(rel))
    }

    /// Additional storage roots to probe under a WSL host: the same relative
    /// path under each mounted Windows user directory.
    pub fn wsl_fallback_roots(&self) -> Vec<PathBuf> {
        if !is_wsl() {
            return Vec::new();
        }
        let Some(rel) = self.windows_path else {
            return Vec::new();
        };
        let users_dir = PathBuf::from("/mnt/c/Users");
        let Ok(entries) = std::fs::read_dir(&users_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.path().join(rel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_source() {
        for src in Source::all() {
            let d = descriptor(*src);
            assert_eq!(d.id, *src);
            assert!(d.usable_budget_tokens <= d.context_window_tokens);
        }
    }

    #[test]
    fn non_wsl_host_has_no_fallback_roots() {
        if !is_wsl() {
            let d = descriptor(Source::ClaudeCode);
            assert!(d.wsl_fallback_roots().is_empty());
        }
    }
}
