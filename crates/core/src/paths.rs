//! Configuration resolution for the two knobs the engine recognizes:
//! `claude_home` (what gets indexed) and `db_path` (where the store
//! lives). Both are environment-variable overridable, falling back to
//! `dirs`-derived defaults — the same env-first-then-`dirs` shape the
//! server binary uses for its own port/static-dir configuration.

use std::env;
use std::path::PathBuf;

const CLAUDE_HOME_ENV: &str = "CLAUDE_INDEX_HOME";
const DB_PATH_ENV: &str = "CLAUDE_INDEX_DB_PATH";

/// Root above `projects/`. Defaults to `~/.claude`.
pub fn claude_home() -> Option<PathBuf> {
    if let Ok(val) = env::var(CLAUDE_HOME_ENV) {
        if !val.is_empty() {
            return Some(PathBuf::from(val));
        }
    }
    dirs::home_dir().map(|d| d.join(".claude"))
}

/// `<claude_home>/projects/`, the root the Indexer walks.
pub fn projects_root() -> Option<PathBuf> {
    claude_home().map(|d| d.join("projects"))
}

/// Database file path. Defaults to `<claude_home>/data/conversations.db`.
pub fn db_path() -> Option<PathBuf> {
    if let Ok(val) = env::var(DB_PATH_ENV) {
        if !val.is_empty() {
            return Some(PathBuf::from(val));
        }
    }
    claude_home().map(|d| d.join("data").join("conversations.db"))
}
