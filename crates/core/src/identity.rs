//! Pure, path-only functions shared by the Parser and the Indexer:
//! subagent detection, session id derivation, and project-name
//! derivation. None of these touch file contents or the filesystem —
//! they operate on `Path`/`str` values already in hand.

use std::path::{Component, Path};

use regex_lite::Regex;
use tracing::warn;

/// What a file's path alone tells us about its session identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIdentity {
    pub is_subagent: bool,
    pub parent_id: Option<String>,
}

/// A path segment looks UUID-ish if it's all hex digits and dashes,
/// at least 8 characters long.
fn looks_uuid_ish(segment: &str) -> bool {
    let re = Regex::new(r"^[a-f0-9-]{8,}$").expect("static regex is valid");
    re.is_match(&segment.to_ascii_lowercase())
}

/// Subagent detection is a pure function of the path: if any segment
/// equals `subagents` and is not the first segment, the file belongs to
/// a subagent whose parent id is the segment immediately preceding it.
pub fn detect_subagent(path: &Path) -> PathIdentity {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    for (idx, segment) in segments.iter().enumerate() {
        if segment == "subagents" && idx > 0 {
            let parent = segments[idx - 1].clone();
            if !looks_uuid_ish(&parent) {
                warn!(
                    parent = %parent,
                    path = %path.display(),
                    "subagent parent segment does not look like a session id"
                );
            }
            return PathIdentity {
                is_subagent: true,
                parent_id: Some(parent),
            };
        }
    }

    PathIdentity::default()
}

/// Filename stem (no extension) of a path, e.g. `/a/b/agent-1.jsonl` -> `agent-1`.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Session id: the bare stem for top-level sessions, `"<parent_id>_<stem>"`
/// for subagents (the same short filename can reappear under many parents).
pub fn session_id(path: &Path, identity: &PathIdentity) -> String {
    let stem = file_stem(path);
    match &identity.parent_id {
        Some(parent) if identity.is_subagent => format!("{parent}_{stem}"),
        _ => stem,
    }
}

/// `basename` of a `/`-separated cwd string, independent of host OS path
/// conventions (logs are produced on the host the assistant ran on, not
/// necessarily this one).
pub fn basename(value: &str) -> Option<String> {
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Project name when the parsed `cwd` is known: `basename(cwd)`.
pub fn project_from_cwd(cwd: Option<&str>) -> Option<String> {
    cwd.and_then(basename)
}

/// Fallback project name when `cwd` is absent: the first path segment
/// under the projects root, with a single leading `-` stripped. Falls
/// back to `"Unknown"` if no such segment exists.
pub fn project_from_encoded_folder(path: &Path, projects_root: &Path) -> String {
    let relative = path.strip_prefix(projects_root).unwrap_or(path);
    match relative.components().next() {
        Some(Component::Normal(segment)) => {
            let s = segment.to_string_lossy();
            s.strip_prefix('-').unwrap_or(&s).to_string()
        }
        _ => "Unknown".to_string(),
    }
}
