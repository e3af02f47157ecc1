//! Project enrichment: git metadata, a shallow directory tree, and
//! memory-file contents, all best-effort. Every field degrades to absent
//! rather than failing the capture — enrichment is context, not core data.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::model::{ProjectContext, Source};
use crate::registry;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);
const STRUCTURE_LINE_CAP: usize = 40;
const MEMORY_FILE_CHAR_CAP: usize = 2000;

/// Populate every enrichment field for `path`. `source` selects which
/// memory-file list to consult (e.g. `CLAUDE.md` for claude-code).
pub fn enrich(path: &Path, source: Source) -> ProjectContext {
    ProjectContext {
        path: path.display().to_string(),
        name: Some(project_name(path)),
        git_branch: run_git(path, &["branch", "--show-current"]).filter(|s| !s.is_empty()),
        git_status: run_git(path, &["status", "--short"]),
        git_log: run_git(path, &["log", "--oneline", "-10"])
            .map(|s| s.lines().map(|l| l.to_string()).collect())
            .unwrap_or_default(),
        structure: directory_tree(path),
        memory_file_contents: memory_file_contents(path, source),
    }
}

fn project_name(path: &Path) -> String {
    package_json_name(path).unwrap_or_else(|| {
        path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| path.display().to_string())
    })
}

fn package_json_name(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    value.get("name").and_then(|n| n.as_str()).map(String::from)
}

/// Run a git subcommand in `dir`, bounded by `GIT_TIMEOUT`. Any non-zero
/// exit, missing binary, or timeout yields `None` — the caller treats that
/// the same as "unknown".
fn run_git(dir: &Path, args: &[&str]) -> Option<String> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    match child.wait_timeout(GIT_TIMEOUT).ok()? {
        Some(status) if status.success() => {
            let mut stdout = child.stdout.take()?;
            let mut buf = String::new();
            std::io::Read::read_to_string(&mut stdout, &mut buf).ok()?;
            Some(buf.trim().to_string())
        }
        Some(_) => None,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            None
        }
    }
}

/// A depth-2 directory tree under `path`, excluding `node_modules` and
/// `.git`, capped at `STRUCTURE_LINE_CAP` lines.
fn directory_tree(path: &Path) -> Option<String> {
    let mut lines = Vec::new();
    walk_tree(path, 0, 2, &mut lines);
    if lines.is_empty() {
        return None;
    }
    lines.truncate(STRUCTURE_LINE_CAP);
    Some(lines.join("\n"))
}

fn walk_tree(dir: &Path, depth: usize, max_depth: usize, lines: &mut Vec<String>) {
    if depth > max_depth || lines.len() >= STRUCTURE_LINE_CAP {
        return;
    }
    let Ok(mut entries) = std::fs::read_dir(dir).map(|e| e.filter_map(|e| e.ok()).collect::<Vec<_>>()) else {
        return;
    };
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        if lines.len() >= STRUCTURE_LINE_CAP {
            return;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "node_modules" || name == ".git" {
            continue;
        }
        let indent = "  ".repeat(depth);
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        lines.push(format!("{indent}{name}{}", if is_dir { "/" } else { "" }));
        if is_dir {
            walk_tree(&entry.path(), depth + 1, max_depth, lines);
        }
    }
}

fn memory_file_contents(path: &Path, source: Source) -> Option<String> {
    let files = registry::descriptor(source).memory_files;
    let combined: String = files
        .iter()
        .filter_map(|f| std::fs::read_to_string(path.join(f)).ok())
        .collect::<Vec<_>>()
        .join("\n\n");
    if combined.is_empty() {
        return None;
    }
    let truncated: String = combined.chars().take(MEMORY_FILE_CHAR_CAP).collect();
    Some(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn project_name_falls_back_to_basename() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("my-project");
        fs::create_dir(&sub).unwrap();
        assert_eq!(project_name(&sub), "my-project");
    }

    #[test]
    fn project_name_prefers_package_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"real-name"}"#).unwrap();
        assert_eq!(project_name(dir.path()), "real-name");
    }

    #[test]
    fn directory_tree_excludes_node_modules_and_git() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "").unwrap();

        let tree = directory_tree(dir.path()).unwrap();
        assert!(!tree.contains("node_modules"));
        assert!(!tree.contains(".git"));
        assert!(tree.contains("src/"));
        assert!(tree.contains("main.rs"));
    }

    #[test]
    fn memory_file_contents_truncates_and_combines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("CLAUDE.md"), "hello").unwrap();
        let contents = memory_file_contents(dir.path(), Source::ClaudeCode).unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn missing_git_repo_yields_none_fields() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_git(dir.path(), &["branch", "--show-current"]).is_none() || run_git(dir.path(), &["branch", "--show-current"]).unwrap().is_empty());
    }
}
