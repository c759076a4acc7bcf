// crates/db/src/migrations.rs
//! Inline, forward-only SQL migrations, tracked in a `_migrations` table
//! so non-idempotent statements (`ALTER TABLE ADD COLUMN`) only run once.
//! Deliberately split across two steps so the `is_subagent`/`parent_id`/
//! `cwd` columns — added after the base schema existed — go through the
//! same add-column-then-backfill path a live deployment would have taken.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: base schema.
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    project TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    file_size INTEGER NOT NULL DEFAULT 0,
    last_modified INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL DEFAULT 0,
    indexed_at INTEGER NOT NULL DEFAULT 0,
    tokens_total INTEGER NOT NULL DEFAULT 0,
    tokens_input INTEGER NOT NULL DEFAULT 0,
    tokens_output INTEGER NOT NULL DEFAULT 0,
    primary_model TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_last_modified ON sessions(last_modified DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_tokens_total ON sessions(tokens_total DESC);"#,
    r#"
CREATE TABLE IF NOT EXISTS tool_usage (
    session_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    call_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (session_id, tool_name)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tool_usage_tool_name ON tool_usage(tool_name);"#,
    r#"
CREATE TABLE IF NOT EXISTS file_tracking (
    file_path TEXT PRIMARY KEY,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    indexed_at INTEGER NOT NULL
);
"#,
    r#"
CREATE VIRTUAL TABLE IF NOT EXISTS fts_sessions USING fts5(
    session_id UNINDEXED,
    content,
    project,
    tokenize = 'unicode61 remove_diacritics 2'
);
"#,
    // Migration: subagent/hierarchy columns, added after the base schema
    // existed — backfilled separately in `backfill_subagent_columns`
    // since deriving parent ids from `file_path` needs path-segment logic
    // beyond what plain SQL can express portably.
    r#"ALTER TABLE sessions ADD COLUMN is_subagent INTEGER NOT NULL DEFAULT 0;"#,
    r#"ALTER TABLE sessions ADD COLUMN parent_id TEXT;"#,
    r#"ALTER TABLE sessions ADD COLUMN cwd TEXT;"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_parent_id ON sessions(parent_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_is_subagent ON sessions(is_subagent);"#,
];
