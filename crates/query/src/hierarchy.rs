// crates/query/src/hierarchy.rs
//! Parent/subagent presentation grouping (spec §4.4): given a flat result
//! set containing both parents and subagents, nest each subagent under its
//! parent — fetching a display-only stub from the Store when the parent
//! itself didn't match the query — and append true orphans at the end.

use std::collections::{HashMap, HashSet};

use claude_index_core::SessionRecord;
use claude_index_db::{SearchHit, Store};

use crate::error::QueryResult;

/// Minimal accessors `group_hierarchy` needs from a result row, so the
/// grouping logic works identically over `SessionRecord` (list) and
/// `SearchHit` (search) without duplicating it per caller.
pub trait SessionLike {
    fn id(&self) -> &str;
    fn parent_id(&self) -> Option<&str>;
    fn is_subagent(&self) -> bool;
    fn last_modified(&self) -> i64;
}

impl SessionLike for SessionRecord {
    fn id(&self) -> &str {
        &self.id
    }
    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }
    fn is_subagent(&self) -> bool {
        self.is_subagent
    }
    fn last_modified(&self) -> i64 {
        self.last_modified
    }
}

impl SessionLike for SearchHit {
    fn id(&self) -> &str {
        &self.session.id
    }
    fn parent_id(&self) -> Option<&str> {
        self.session.parent_id.as_deref()
    }
    fn is_subagent(&self) -> bool {
        self.session.is_subagent
    }
    fn last_modified(&self) -> i64 {
        self.session.last_modified
    }
}

/// One row of a hierarchy-grouped result.
#[derive(Debug, Clone)]
pub enum HierarchyItem<T> {
    /// A parent that matched the original query, with its subagent count
    /// across the full subagent set (not just the ones nested below it).
    Parent { item: T, subagent_count: usize },
    /// A parent that didn't itself match but was fetched so its matching
    /// subagents have somewhere to nest. Display-only — never appears in
    /// the underlying query's own result set.
    StubParent {
        session: SessionRecord,
        subagent_count: usize,
    },
    /// A subagent nested under the parent or stub parent immediately
    /// above it.
    Subagent { item: T },
    /// A subagent whose parent couldn't be found at all (no match, no
    /// stub — e.g. the parent file was itself deleted).
    Orphan { item: T },
}

enum ParentSlot<T> {
    Real(T),
    Stub(SessionRecord),
}

impl<T: SessionLike> ParentSlot<T> {
    fn id(&self) -> &str {
        match self {
            ParentSlot::Real(item) => item.id(),
            ParentSlot::Stub(session) => &session.id,
        }
    }

    fn last_modified(&self) -> i64 {
        match self {
            ParentSlot::Real(item) => item.last_modified(),
            ParentSlot::Stub(session) => session.last_modified,
        }
    }
}

/// Group a flat `(parents ++ subagents)` result set into parent-then-
/// children presentation order:
///
/// 1. Partition into parents and subagents.
/// 2. Fetch a display-only stub for any subagent parent missing from the
///    parent set.
/// 3. Count subagents per parent across the whole subagent set.
/// 4. Sort all parents (real + stub) by `last_modified` desc.
/// 5. Emit each parent followed by its subagents (sorted `last_modified`
///    desc, ties broken by original order — a stable sort).
/// 6. Append true orphans (no parent, no stub) at the end, original order.
pub async fn group_hierarchy<T>(store: &Store, items: Vec<T>) -> QueryResult<Vec<HierarchyItem<T>>>
where
    T: SessionLike + Clone,
{
    let (parents, subagents): (Vec<T>, Vec<T>) =
        items.into_iter().partition(|item| !item.is_subagent());

    let parent_ids: HashSet<&str> = parents.iter().map(|p| p.id()).collect();

    let mut stubs: HashMap<String, SessionRecord> = HashMap::new();
    for sub in &subagents {
        if let Some(pid) = sub.parent_id() {
            if !parent_ids.contains(pid) && !stubs.contains_key(pid) {
                if let Some(session) = store.get_session(pid).await? {
                    stubs.insert(pid.to_string(), session);
                }
            }
        }
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for sub in &subagents {
        if let Some(pid) = sub.parent_id() {
            *counts.entry(pid).or_default() += 1;
        }
    }

    let mut parent_slots: Vec<ParentSlot<T>> = parents.into_iter().map(ParentSlot::Real).collect();
    parent_slots.extend(stubs.into_values().map(ParentSlot::Stub));
    parent_slots.sort_by(|a, b| b.last_modified().cmp(&a.last_modified()));

    let mut output = Vec::new();
    let mut used: HashSet<usize> = HashSet::new();

    for slot in parent_slots {
        let parent_id = slot.id().to_string();
        let subagent_count = counts.get(parent_id.as_str()).copied().unwrap_or(0);
        output.push(match slot {
            ParentSlot::Real(item) => HierarchyItem::Parent { item, subagent_count },
            ParentSlot::Stub(session) => HierarchyItem::StubParent { session, subagent_count },
        });

        let mut children: Vec<usize> = (0..subagents.len())
            .filter(|idx| !used.contains(idx) && subagents[*idx].parent_id() == Some(parent_id.as_str()))
            .collect();
        children.sort_by(|&a, &b| subagents[b].last_modified().cmp(&subagents[a].last_modified()));
        for idx in children {
            used.insert(idx);
            output.push(HierarchyItem::Subagent {
                item: subagents[idx].clone(),
            });
        }
    }

    for (idx, sub) in subagents.iter().enumerate() {
        if !used.contains(&idx) {
            output.push(HierarchyItem::Orphan { item: sub.clone() });
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_index_db::Database;

    fn session(id: &str, parent_id: Option<&str>, is_subagent: bool, last_modified: i64) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            file_path: format!("/root/projects/-proj/{id}.jsonl"),
            filename: format!("{id}.jsonl"),
            project: "proj".to_string(),
            cwd: None,
            message_count: 1,
            file_size: 10,
            last_modified,
            created: last_modified,
            indexed_at: last_modified,
            tokens_total: 0,
            tokens_input: 0,
            tokens_output: 0,
            primary_model: None,
            is_subagent,
            parent_id: parent_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn groups_subagents_under_their_matched_parent() {
        let db = Database::new_in_memory().await.unwrap();
        let store = claude_index_db::Store::new(&db);

        let items = vec![
            session("parent1", None, false, 100),
            session("parent1_agentA", Some("parent1"), true, 50),
            session("parent1_agentB", Some("parent1"), true, 90),
        ];

        let grouped = group_hierarchy(&store, items).await.unwrap();
        assert_eq!(grouped.len(), 3);
        assert!(matches!(grouped[0], HierarchyItem::Parent { subagent_count: 2, .. }));
        // subagents ordered by last_modified desc under their parent
        assert!(matches!(&grouped[1], HierarchyItem::Subagent { item } if item.id == "parent1_agentB"));
        assert!(matches!(&grouped[2], HierarchyItem::Subagent { item } if item.id == "parent1_agentA"));
    }

    #[tokio::test]
    async fn fetches_stub_parent_when_parent_not_in_result_set() {
        let db = Database::new_in_memory().await.unwrap();
        let store = claude_index_db::Store::new(&db);
        store
            .upsert_session(&session("missing_parent", None, false, 10), "text", &[])
            .await
            .unwrap();

        let items = vec![session(
            "missing_parent_agent",
            Some("missing_parent"),
            true,
            5,
        )];

        let grouped = group_hierarchy(&store, items).await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert!(matches!(
            grouped[0],
            HierarchyItem::StubParent { subagent_count: 1, .. }
        ));
        assert!(matches!(grouped[1], HierarchyItem::Subagent { .. }));
    }

    #[tokio::test]
    async fn orphan_subagent_with_no_resolvable_parent_is_appended_last() {
        let db = Database::new_in_memory().await.unwrap();
        let store = claude_index_db::Store::new(&db);

        let items = vec![
            session("parent1", None, false, 100),
            session("orphan_agent", Some("deleted_parent"), true, 200),
        ];

        let grouped = group_hierarchy(&store, items).await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert!(matches!(grouped[0], HierarchyItem::Parent { .. }));
        assert!(matches!(&grouped[1], HierarchyItem::Orphan { item } if item.id == "orphan_agent"));
    }
}
