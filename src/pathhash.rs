//! Claude Code's project-directory path-hash codec.
//!
//! Claude Code stores each project's sessions under a directory named after
//! the absolute project path with `/` replaced by `-`. On windows-like hosts
//! backslashes become `/` first, then the drive-letter colon becomes `-`.
//! Decoding runs the transform in reverse: a leading `-` means a Unix root, a
//! leading single-letter-then-`-` means a windows-like drive letter.

use crate::registry::HostFamily;

/// Encode an absolute project path into Claude Code's directory-name form.
pub fn encode(path: &str, host: HostFamily) -> String {
    let normalized = if host == HostFamily::Windows {
        path.replace('\\', "/")
    } else {
        path.to_string()
    };
    let normalized = if host == HostFamily::Windows {
        // "C:/Users/..." -> "C-/Users/..." so the drive-letter colon also
        // becomes a dash when every `/` does.
        if let Some((drive, rest)) = normalized.split_once(':') {
            format!("{drive}-{rest}")
        } else {
            normalized
        }
    } else {
        normalized
    };
    normalized.replace('/', "-")
}

/// Decode a Claude Code storage directory name back into an absolute path.
///
/// A leading `-` implies a Unix root (`-Users-me-proj` -> `/Users/me/proj`).
/// A leading single ASCII letter followed by `-` implies a windows-like drive
/// letter (`C-Users-me-proj` -> `C:/Users/me/proj`).
pub fn decode(dirname: &str) -> Option<String> {
    if dirname.is_empty() {
        return None;
    }
    let bytes = dirname.as_bytes();
    if bytes[0] == b'-' {
        let rest = &dirname[1..];
        return Some(format!("/{}", rest.replace('-', "/")));
    }
    if bytes[0].is_ascii_alphabetic() && bytes.get(1) == Some(&b'-') {
        let drive = bytes[0] as char;
        let rest = &dirname[2..];
        return Some(format!("{drive}:/{}", rest.replace('-', "/")));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_unix_path() {
        assert_eq!(encode("/Users/me/proj", HostFamily::Linux), "-Users-me-proj");
    }

    #[test]
    fn decodes_unix_path() {
        assert_eq!(decode("-Users-me-proj").as_deref(), Some("/Users/me/proj"));
    }

    #[test]
    fn encodes_windows_path() {
        assert_eq!(
            encode("C:\\Users\\me\\proj", HostFamily::Windows),
            "C-Users-me-proj"
        );
    }

    #[test]
    fn decodes_windows_drive_path() {
        assert_eq!(
            decode("C-Users-me-proj").as_deref(),
            Some("C:/Users/me/proj")
        );
    }

    #[test]
    fn round_trips_unix_path() {
        let original = "/Users/me/proj/sub";
        let encoded = encode(original, HostFamily::Linux);
        assert_eq!(decode(&encoded).as_deref(), Some(original));
    }

    #[test]
    fn empty_dirname_decodes_to_none() {
        assert_eq!(decode(""), None);
    }
}
