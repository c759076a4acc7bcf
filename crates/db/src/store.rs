// crates/db/src/store.rs
//! Store operations: transactional upserts, paged listing, ranked
//! search, tool/summary aggregates, and project-identity resolution.

use std::collections::HashSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use claude_index_core::{SessionRecord, SortBy, SortOrder};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use tracing::warn;

use crate::fts::sanitize_fts_query;
use crate::Database;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: String,
    file_path: String,
    filename: String,
    project: String,
    cwd: Option<String>,
    message_count: i64,
    file_size: i64,
    last_modified: i64,
    created: i64,
    indexed_at: i64,
    tokens_total: i64,
    tokens_input: i64,
    tokens_output: i64,
    primary_model: Option<String>,
    is_subagent: i64,
    parent_id: Option<String>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        SessionRecord {
            id: row.id,
            file_path: row.file_path,
            filename: row.filename,
            project: row.project,
            cwd: row.cwd,
            message_count: row.message_count,
            file_size: row.file_size,
            last_modified: row.last_modified,
            created: row.created,
            indexed_at: row.indexed_at,
            tokens_total: row.tokens_total,
            tokens_input: row.tokens_input,
            tokens_output: row.tokens_output,
            primary_model: row.primary_model,
            is_subagent: row.is_subagent != 0,
            parent_id: row.parent_id,
        }
    }
}

const SESSION_COLUMNS: &str = "id, file_path, filename, project, cwd, message_count, file_size, \
     last_modified, created, indexed_at, tokens_total, tokens_input, tokens_output, \
     primary_model, is_subagent, parent_id";

/// A ranked search result: the session plus presentation-only fields
/// that only make sense in the context of a particular query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub session: SessionRecord,
    pub relevance: f64,
    pub snippet: String,
    pub search_term: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolStat {
    pub total_calls: i64,
    pub distinct_sessions: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryStats {
    pub session_count: i64,
    pub message_count: i64,
    pub tokens_total: i64,
    pub bytes_total: i64,
    pub project_count: i64,
    pub sessions_last_24h: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The Store: a thin, query-oriented wrapper around a `Database` handle.
/// Every mutation here is one transaction; nothing here partially
/// applies on error.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn needs_indexing(&self, path: &str, mtime: i64, size: i64) -> StoreResult<bool> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT mtime, size FROM file_tracking WHERE file_path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            Some((tracked_mtime, tracked_size)) => tracked_mtime != mtime || tracked_size != size,
            None => true,
        })
    }

    pub async fn upsert_session(
        &self,
        record: &SessionRecord,
        searchable_text: &str,
        tool_counts: &[(String, u32)],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tool_usage WHERE session_id = ?")
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fts_sessions WHERE session_id = ?")
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, file_path, filename, project, cwd, message_count, file_size,
                last_modified, created, indexed_at, tokens_total, tokens_input,
                tokens_output, primary_model, is_subagent, parent_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                file_path = excluded.file_path,
                filename = excluded.filename,
                project = excluded.project,
                cwd = excluded.cwd,
                message_count = excluded.message_count,
                file_size = excluded.file_size,
                last_modified = excluded.last_modified,
                created = excluded.created,
                indexed_at = excluded.indexed_at,
                tokens_total = excluded.tokens_total,
                tokens_input = excluded.tokens_input,
                tokens_output = excluded.tokens_output,
                primary_model = excluded.primary_model,
                is_subagent = excluded.is_subagent,
                parent_id = excluded.parent_id
            "#,
        )
        .bind(&record.id)
        .bind(&record.file_path)
        .bind(&record.filename)
        .bind(&record.project)
        .bind(&record.cwd)
        .bind(record.message_count)
        .bind(record.file_size)
        .bind(record.last_modified)
        .bind(record.created)
        .bind(record.indexed_at)
        .bind(record.tokens_total)
        .bind(record.tokens_input)
        .bind(record.tokens_output)
        .bind(&record.primary_model)
        .bind(record.is_subagent as i64)
        .bind(&record.parent_id)
        .execute(&mut *tx)
        .await?;

        for (name, count) in tool_counts {
            sqlx::query(
                "INSERT INTO tool_usage (session_id, tool_name, call_count) VALUES (?, ?, ?)",
            )
            .bind(&record.id)
            .bind(name)
            .bind(*count as i64)
            .execute(&mut *tx)
            .await?;
        }

        if !searchable_text.trim().is_empty() {
            sqlx::query(
                "INSERT INTO fts_sessions (session_id, content, project) VALUES (?, ?, ?)",
            )
            .bind(&record.id)
            .bind(searchable_text)
            .bind(&record.project)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO file_tracking (file_path, mtime, size, indexed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                mtime = excluded.mtime,
                size = excluded.size,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&record.file_path)
        .bind(record.last_modified)
        .bind(record.file_size)
        .bind(record.indexed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_session(&self, id: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        remove_session_in_tx(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_file(&self, path: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM sessions WHERE file_path = ?")
                .bind(path)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((id,)) = existing {
            sqlx::query("UPDATE sessions SET parent_id = NULL WHERE parent_id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            remove_session_in_tx(&mut tx, &id).await?;
        }

        sqlx::query("DELETE FROM file_tracking WHERE file_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_sessions(
        &self,
        limit: i64,
        offset: i64,
        sort_by: SortBy,
        order: SortOrder,
        project: Option<&str>,
        include_subagents: bool,
    ) -> StoreResult<Vec<SessionRecord>> {
        let sql = format!(
            "SELECT {cols} FROM sessions \
             WHERE (? IS NULL OR project = ?) \
               AND (? = 1 OR is_subagent = 0) \
             ORDER BY {col} {order} \
             LIMIT ? OFFSET ?",
            cols = SESSION_COLUMNS,
            col = sort_by.column(),
            order = order.sql(),
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&sql)
            .bind(project)
            .bind(project)
            .bind(include_subagents as i64)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    pub async fn get_session(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SessionRecord::from))
    }

    pub async fn count_sessions(&self, project: Option<&str>) -> StoreResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE ? IS NULL OR project = ?")
                .bind(project)
                .bind(project)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    pub async fn list_projects(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT project FROM sessions WHERE project IS NOT NULL ORDER BY project ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    pub async fn tool_stats(&self) -> StoreResult<Vec<(String, ToolStat)>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT tool_name, SUM(call_count) as total_calls, COUNT(DISTINCT session_id) as distinct_sessions \
             FROM tool_usage GROUP BY tool_name ORDER BY total_calls DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, total_calls, distinct_sessions)| {
                (
                    name,
                    ToolStat {
                        total_calls,
                        distinct_sessions,
                    },
                )
            })
            .collect())
    }

    pub async fn summary(&self) -> StoreResult<SummaryStats> {
        let totals: (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(message_count),0), COALESCE(SUM(tokens_total),0), \
             COALESCE(SUM(file_size),0), COUNT(DISTINCT project) FROM sessions",
        )
        .fetch_one(&self.pool)
        .await?;

        let cutoff = now_ms() - 24 * 60 * 60 * 1000;
        let recent: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE last_modified >= ?")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;

        Ok(SummaryStats {
            session_count: totals.0,
            message_count: totals.1,
            tokens_total: totals.2,
            bytes_total: totals.3,
            project_count: totals.4,
            sessions_last_24h: recent.0,
        })
    }

    pub async fn indexed_paths(&self) -> StoreResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT file_path FROM file_tracking")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Search with BM25 ranking and snippets. The caller is responsible
    /// for the empty-query short-circuit (§4.4) — by the time `raw_query`
    /// reaches here it is assumed non-empty, though it may sanitize down
    /// to the wildcard sentinel.
    pub async fn search(
        &self,
        raw_query: &str,
        limit: i64,
        offset: i64,
        project: Option<&str>,
        include_subagents: bool,
    ) -> StoreResult<Vec<SearchHit>> {
        let sanitized = sanitize_fts_query(raw_query);
        match self
            .search_ranked(&sanitized, raw_query, limit, offset, project, include_subagents)
            .await
        {
            Ok(hits) => Ok(hits),
            Err(e) => {
                warn!(error = %e, "FTS search failed, falling back to unranked listing");
                let sessions = self
                    .list_sessions(
                        limit,
                        offset,
                        SortBy::LastModified,
                        SortOrder::Desc,
                        project,
                        include_subagents,
                    )
                    .await?;
                Ok(sessions
                    .into_iter()
                    .map(|session| SearchHit {
                        session,
                        relevance: 0.0,
                        snippet: String::new(),
                        search_term: raw_query.to_string(),
                    })
                    .collect())
            }
        }
    }

    async fn search_ranked(
        &self,
        sanitized: &str,
        original_query: &str,
        limit: i64,
        offset: i64,
        project: Option<&str>,
        include_subagents: bool,
    ) -> StoreResult<Vec<SearchHit>> {
        if sanitized == "*" {
            let sql = format!(
                "SELECT {cols} FROM sessions s \
                 JOIN fts_sessions f ON f.session_id = s.id \
                 WHERE (? IS NULL OR s.project = ?) \
                   AND (? = 1 OR s.is_subagent = 0) \
                 ORDER BY s.last_modified DESC \
                 LIMIT ? OFFSET ?",
                cols = SESSION_COLUMNS
                    .split(", ")
                    .map(|c| format!("s.{c}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            let rows: Vec<SessionRow> = sqlx::query_as(&sql)
                .bind(project)
                .bind(project)
                .bind(include_subagents as i64)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
            return Ok(rows
                .into_iter()
                .map(|row| SearchHit {
                    session: SessionRecord::from(row),
                    relevance: 0.0,
                    snippet: String::new(),
                    search_term: original_query.to_string(),
                })
                .collect());
        }

        let sql = format!(
            "SELECT {cols}, bm25(fts_sessions) AS rank, \
               snippet(fts_sessions, 1, '{{{{MATCH}}}}', '{{{{/MATCH}}}}', '...', 20) AS snip \
             FROM fts_sessions \
             JOIN sessions s ON s.id = fts_sessions.session_id \
             WHERE fts_sessions MATCH ? \
               AND (? IS NULL OR s.project = ?) \
               AND (? = 1 OR s.is_subagent = 0) \
             ORDER BY rank ASC \
             LIMIT ? OFFSET ?",
            cols = SESSION_COLUMNS
                .split(", ")
                .map(|c| format!("s.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        );

        #[derive(FromRow)]
        struct Row {
            id: String,
            file_path: String,
            filename: String,
            project: String,
            cwd: Option<String>,
            message_count: i64,
            file_size: i64,
            last_modified: i64,
            created: i64,
            indexed_at: i64,
            tokens_total: i64,
            tokens_input: i64,
            tokens_output: i64,
            primary_model: Option<String>,
            is_subagent: i64,
            parent_id: Option<String>,
            rank: f64,
            snip: String,
        }

        let rows: Vec<Row> = sqlx::query_as(&sql)
            .bind(sanitized)
            .bind(project)
            .bind(project)
            .bind(include_subagents as i64)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                session: SessionRecord::from(SessionRow {
                    id: row.id,
                    file_path: row.file_path,
                    filename: row.filename,
                    project: row.project,
                    cwd: row.cwd,
                    message_count: row.message_count,
                    file_size: row.file_size,
                    last_modified: row.last_modified,
                    created: row.created,
                    indexed_at: row.indexed_at,
                    tokens_total: row.tokens_total,
                    tokens_input: row.tokens_input,
                    tokens_output: row.tokens_output,
                    primary_model: row.primary_model,
                    is_subagent: row.is_subagent,
                    parent_id: row.parent_id,
                }),
                relevance: row.rank,
                snippet: row.snip,
                search_term: original_query.to_string(),
            })
            .collect())
    }

    /// See spec §4.3: basename of the shortest non-null cwd in each
    /// encoded-folder group becomes the canonical project name.
    pub async fn resolve_project_names(
        &self,
        projects_root: &Path,
    ) -> StoreResult<(usize, usize)> {
        let rows: Vec<(String, String, Option<String>, String)> =
            sqlx::query_as("SELECT id, file_path, cwd, project FROM sessions")
                .fetch_all(&self.pool)
                .await?;

        let mut groups: std::collections::HashMap<String, Vec<(String, Option<String>, String)>> =
            std::collections::HashMap::new();
        for (id, file_path, cwd, project) in rows {
            let folder = encoded_folder(Path::new(&file_path), projects_root);
            groups.entry(folder).or_default().push((id, cwd, project));
        }

        let mut sessions_updated = 0usize;
        let mut groups_updated = 0usize;

        let mut tx = self.pool.begin().await?;
        for (_, members) in groups {
            let mut cwds: Vec<&str> = members
                .iter()
                .filter_map(|(_, cwd, _)| cwd.as_deref())
                .collect();
            cwds.sort_by_key(|c| c.len());
            let Some(shortest) = cwds.first() else {
                continue;
            };
            let Some(canonical) = claude_index_core::identity::basename(shortest) else {
                continue;
            };

            let mut touched_group = false;
            for (id, _, project) in &members {
                if project != &canonical {
                    sqlx::query("UPDATE sessions SET project = ? WHERE id = ?")
                        .bind(&canonical)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query("UPDATE fts_sessions SET project = ? WHERE session_id = ?")
                        .bind(&canonical)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    sessions_updated += 1;
                    touched_group = true;
                }
            }
            if touched_group {
                groups_updated += 1;
            }
        }
        tx.commit().await?;

        Ok((sessions_updated, groups_updated))
    }

    pub async fn vacuum(&self) -> StoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(self) {
        let _ = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await;
        self.pool.close().await;
    }
}

async fn remove_session_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &str,
) -> StoreResult<()> {
    sqlx::query("DELETE FROM tool_usage WHERE session_id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM fts_sessions WHERE session_id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// The path segment immediately under `projects_root` — the lossy
/// slash-to-dash encoded project folder name, kept as-is (not stripped
/// of its leading dash) since it's only used as a grouping key here.
fn encoded_folder(path: &Path, projects_root: &Path) -> String {
    let relative = path.strip_prefix(projects_root).unwrap_or(path);
    relative
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default()
}
