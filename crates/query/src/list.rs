// crates/query/src/list.rs
use claude_index_core::{SessionRecord, SortBy, SortOrder};
use claude_index_db::Store;

use crate::error::QueryResult;
use crate::hierarchy::{group_hierarchy, HierarchyItem};

/// Options shared by every `list_sessions` call.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub limit: i64,
    pub offset: i64,
    pub sort_by: SortBy,
    pub order: SortOrder,
    pub project: Option<String>,
    pub include_subagents: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            sort_by: SortBy::LastModified,
            order: SortOrder::Desc,
            project: None,
            include_subagents: false,
        }
    }
}

/// The shape `list_sessions` hands back: a flat page when subagents
/// weren't requested (so the caller's chosen sort order is preserved
/// untouched), or a hierarchy-grouped page when they were.
#[derive(Debug, Clone)]
pub enum ListResult {
    Flat(Vec<SessionRecord>),
    Grouped(Vec<HierarchyItem<SessionRecord>>),
}

/// List sessions (spec §4.4): delegates directly to `Store::list_sessions`.
/// Grouping by parent/subagent is only meaningful — and only applied —
/// when `include_subagents` is set; otherwise the page is exactly what
/// the Store returned, in the caller's requested sort order.
pub async fn list_sessions(store: &Store, opts: &ListOptions) -> QueryResult<ListResult> {
    let sessions = store
        .list_sessions(
            opts.limit,
            opts.offset,
            opts.sort_by,
            opts.order,
            opts.project.as_deref(),
            opts.include_subagents,
        )
        .await?;

    if opts.include_subagents {
        Ok(ListResult::Grouped(group_hierarchy(store, sessions).await?))
    } else {
        Ok(ListResult::Flat(sessions))
    }
}
