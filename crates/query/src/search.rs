// crates/query/src/search.rs
use claude_index_db::{SearchHit, Store};

use crate::error::QueryResult;
use crate::hierarchy::{group_hierarchy, HierarchyItem};

/// Options shared by every `search_sessions` call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: i64,
    pub offset: i64,
    pub project: Option<String>,
    pub include_subagents: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            project: None,
            include_subagents: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SearchResult {
    Flat(Vec<SearchHit>),
    Grouped(Vec<HierarchyItem<SearchHit>>),
}

/// Ranked full-text search with snippets (spec §4.4).
///
/// An empty or whitespace-only query short-circuits to an empty result —
/// this is distinct from a query that sanitizes down to nothing (e.g.
/// `"AND OR"`, all operator tokens), which is non-empty input and falls
/// through to `Store::search`'s wildcard match-everything path.
pub async fn search_sessions(
    store: &Store,
    raw_query: &str,
    opts: &SearchOptions,
) -> QueryResult<SearchResult> {
    if raw_query.trim().is_empty() {
        return Ok(SearchResult::Flat(Vec::new()));
    }

    let hits = store
        .search(
            raw_query,
            opts.limit,
            opts.offset,
            opts.project.as_deref(),
            opts.include_subagents,
        )
        .await?;

    if opts.include_subagents {
        Ok(SearchResult::Grouped(group_hierarchy(store, hits).await?))
    } else {
        Ok(SearchResult::Flat(hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_index_core::SessionRecord;
    use claude_index_db::Database;

    fn sample(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            file_path: format!("/root/projects/-proj/{id}.jsonl"),
            filename: format!("{id}.jsonl"),
            project: "proj".to_string(),
            cwd: None,
            message_count: 1,
            file_size: 10,
            last_modified: 10,
            created: 10,
            indexed_at: 10,
            tokens_total: 0,
            tokens_input: 0,
            tokens_output: 0,
            primary_model: None,
            is_subagent: false,
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn empty_query_returns_empty_not_full_listing() {
        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(&db);
        store.upsert_session(&sample("s1"), "hello world", &[]).await.unwrap();

        let result = search_sessions(&store, "   ", &SearchOptions::default()).await.unwrap();
        assert!(matches!(result, SearchResult::Flat(v) if v.is_empty()));
    }

    #[tokio::test]
    async fn operator_only_query_matches_everything() {
        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(&db);
        store.upsert_session(&sample("s1"), "hello world", &[]).await.unwrap();

        let result = search_sessions(&store, "AND OR", &SearchOptions::default()).await.unwrap();
        match result {
            SearchResult::Flat(hits) => assert_eq!(hits.len(), 1),
            SearchResult::Grouped(_) => panic!("subagents weren't requested"),
        }
    }

    #[tokio::test]
    async fn matching_query_returns_snippet_and_relevance() {
        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(&db);
        store
            .upsert_session(&sample("s1"), "the quick brown fox jumps", &[])
            .await
            .unwrap();

        let result = search_sessions(&store, "fox", &SearchOptions::default()).await.unwrap();
        match result {
            SearchResult::Flat(hits) => {
                assert_eq!(hits.len(), 1);
                assert!(hits[0].snippet.contains("{{MATCH}}"));
                assert_eq!(hits[0].search_term, "fox");
            }
            SearchResult::Grouped(_) => panic!("subagents weren't requested"),
        }
    }
}
