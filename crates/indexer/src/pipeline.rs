// crates/indexer/src/pipeline.rs
//! The five-step full indexing pass (discover, plan, index, reconcile,
//! resolve identities) plus the single-file re-index entry point used by
//! the external watcher collaborator.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::UNIX_EPOCH;

use claude_index_core::identity::{detect_subagent, project_from_cwd, project_from_encoded_folder, session_id};
use claude_index_core::parser::parse_session;
use claude_index_core::SessionRecord;
use claude_index_db::Store;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::IndexError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub scanned: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub removed: usize,
    pub errors: usize,
    pub project_names_resolved: usize,
}

/// Recursively walk `projects_root` collecting every `.jsonl` file.
/// Permission-denied and race-condition errors on individual entries are
/// logged and skipped — they never abort the walk.
fn discover_files(projects_root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(projects_root).into_iter() {
        match entry {
            Ok(e) if e.file_type().is_file() => {
                if e.path().extension().and_then(|ext| ext.to_str()) == Some("jsonl") {
                    files.push(e.into_path());
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry during discovery");
            }
        }
    }
    files
}

fn epoch_ms(time: std::time::SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

async fn file_times(path: &Path) -> std::io::Result<(i64, i64, i64)> {
    let metadata = tokio::fs::metadata(path).await?;
    let last_modified = epoch_ms(metadata.modified()?);
    let created = metadata.created().map(epoch_ms).unwrap_or(last_modified);
    let size = metadata.len() as i64;
    Ok((last_modified, created, size))
}

/// Parse one file and upsert it into the Store. Shared by the full pass
/// and `index_single_file`.
async fn index_one(
    store: &Store,
    path: &Path,
    projects_root: &Path,
    last_modified: i64,
    created: i64,
    file_size: i64,
) -> Result<(), IndexError> {
    let identity = detect_subagent(path);
    let id = session_id(path, &identity);
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parsed = parse_session(path).await.map_err(IndexError::Parse)?;

    let project = project_from_cwd(parsed.cwd.as_deref())
        .unwrap_or_else(|| project_from_encoded_folder(path, projects_root));

    let now = epoch_ms(std::time::SystemTime::now());
    let record = SessionRecord {
        id,
        file_path: path.to_string_lossy().into_owned(),
        filename,
        project,
        cwd: parsed.cwd.clone(),
        message_count: parsed.message_count,
        file_size,
        last_modified,
        created,
        indexed_at: now,
        tokens_total: parsed.token_usage.total(),
        tokens_input: parsed.token_usage.input,
        tokens_output: parsed.token_usage.output,
        primary_model: parsed.model_info.primary.clone(),
        is_subagent: identity.is_subagent,
        parent_id: identity.parent_id,
    };

    store
        .upsert_session(&record, &parsed.searchable_text, &parsed.tool_usage.per_name)
        .await?;
    Ok(())
}

/// Run a complete discover → plan → index → reconcile → resolve pass.
/// `on_progress(processed, total)` fires in batches of `progress_batch`
/// files, not per file. `cancel` is checked between file iterations;
/// when set, the pass stops cleanly with everything completed so far
/// durable and nothing partially applied.
pub async fn run_full_pass(
    store: &Store,
    projects_root: &Path,
    progress_batch: usize,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(usize, usize),
) -> Result<IndexStats, IndexError> {
    let mut stats = IndexStats::default();

    let discovered = discover_files(projects_root);
    stats.scanned = discovered.len();

    let tracked = store.indexed_paths().await?;
    let mut remaining: HashSet<String> = tracked;

    let total = discovered.len();
    for (i, path) in discovered.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let path_str = path.to_string_lossy().into_owned();
        remaining.remove(&path_str);

        let (last_modified, created, size) = match file_times(path).await {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stat failed, skipping file");
                stats.errors += 1;
                continue;
            }
        };

        let needs = match store.needs_indexing(&path_str, last_modified, size).await {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "needs_indexing check failed");
                stats.errors += 1;
                continue;
            }
        };

        if !needs {
            stats.skipped += 1;
        } else {
            match index_one(store, path, projects_root, last_modified, created, size).await {
                Ok(()) => stats.indexed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to index file");
                    stats.errors += 1;
                }
            }
        }

        if (i + 1) % progress_batch == 0 {
            on_progress(i + 1, total);
        }
    }
    on_progress(stats.indexed + stats.skipped + stats.errors, total);

    for path in remaining {
        match store.remove_file(&path).await {
            Ok(()) => stats.removed += 1,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to reconcile removed file");
                stats.errors += 1;
            }
        }
    }

    let (sessions_updated, _groups_updated) = store.resolve_project_names(projects_root).await?;
    stats.project_names_resolved = sessions_updated;

    Ok(stats)
}

/// Re-index a single file, used by the external watcher collaborator on
/// a changed-path notification.
pub async fn index_single_file(
    store: &Store,
    path: &Path,
    projects_root: &Path,
) -> Result<(), IndexError> {
    let (last_modified, created, size) = file_times(path).await.map_err(|e| {
        IndexError::Parse(claude_index_core::error::ParseError::io(path, e))
    })?;
    index_one(store, path, projects_root, last_modified, created, size).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_index_db::Database;
    use std::io::Write;

    async fn setup_test_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_session(root: &Path, project_folder: &str, file_name: &str, lines: &[&str]) -> PathBuf {
        let dir = root.join(project_folder);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file_name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[tokio::test]
    async fn full_pass_indexes_discovered_files() {
        let tmp = setup_test_dir().await;
        write_session(
            tmp.path(),
            "-proj",
            "s1.jsonl",
            &[
                r#"{"type":"user","cwd":"/home/u/proj/my-awesome-project","message":{"content":"hi"}}"#,
                r#"{"type":"assistant","message":{"content":"hello","model":"claude-sonnet-4-20250514","usage":{"input_tokens":1,"output_tokens":1}}}"#,
            ],
        );

        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(&db);
        let cancel = AtomicBool::new(false);
        let stats = run_full_pass(&store, tmp.path(), 50, &cancel, |_, _| {})
            .await
            .unwrap();

        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.errors, 0);

        let sessions = store
            .list_sessions(
                10,
                0,
                claude_index_core::SortBy::LastModified,
                claude_index_core::SortOrder::Desc,
                None,
                true,
            )
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].project, "my-awesome-project");
        assert_eq!(sessions[0].message_count, 2);
    }

    #[tokio::test]
    async fn second_pass_with_no_changes_skips() {
        let tmp = setup_test_dir().await;
        write_session(
            tmp.path(),
            "-proj",
            "s1.jsonl",
            &[r#"{"type":"user","message":{"content":"hi"}}"#],
        );

        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(&db);
        let cancel = AtomicBool::new(false);
        run_full_pass(&store, tmp.path(), 50, &cancel, |_, _| {}).await.unwrap();
        let second = run_full_pass(&store, tmp.path(), 50, &cancel, |_, _| {}).await.unwrap();

        assert_eq!(second.skipped, 1);
        assert_eq!(second.indexed, 0);
    }

    #[tokio::test]
    async fn deleted_file_is_reconciled() {
        let tmp = setup_test_dir().await;
        let path = write_session(
            tmp.path(),
            "-proj",
            "s1.jsonl",
            &[r#"{"type":"user","message":{"content":"hi"}}"#],
        );

        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(&db);
        let cancel = AtomicBool::new(false);
        run_full_pass(&store, tmp.path(), 50, &cancel, |_, _| {}).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let stats = run_full_pass(&store, tmp.path(), 50, &cancel, |_, _| {}).await.unwrap();
        assert_eq!(stats.removed, 1);

        let sessions = store
            .list_sessions(
                10,
                0,
                claude_index_core::SortBy::LastModified,
                claude_index_core::SortOrder::Desc,
                None,
                true,
            )
            .await
            .unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn subagent_files_get_parent_prefixed_ids() {
        let tmp = setup_test_dir().await;
        write_session(
            tmp.path(),
            "-proj/parentA/subagents",
            "agent-1.jsonl",
            &[r#"{"type":"user","message":{"content":"hi"}}"#],
        );
        write_session(
            tmp.path(),
            "-proj/parentB/subagents",
            "agent-1.jsonl",
            &[r#"{"type":"user","message":{"content":"hi"}}"#],
        );

        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(&db);
        let cancel = AtomicBool::new(false);
        let stats = run_full_pass(&store, tmp.path(), 50, &cancel, |_, _| {}).await.unwrap();
        assert_eq!(stats.indexed, 2);

        let a = store.get_session("parentA_agent-1").await.unwrap();
        let b = store.get_session("parentB_agent-1").await.unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(a.unwrap().is_subagent);
    }
}
