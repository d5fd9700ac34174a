//! Bulk-operation scope and derived-metadata recomputation
//!
//! Outside a scope, every write recomputes the course's derived draft-view
//! metadata (has-changes flags and inherited fields). Inside a scope the
//! metadata is only marked dirty, and one recomputation runs when the
//! outermost scope for that course ends. Scopes nest per course.
//!
//! Lock order: the scope map is never held while a course lock is taken.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use coursestore_core::{BlockKey, Branch, CourseKey, Fields};
use coursestore_storage::CourseState;

use super::{ModuleStore, INHERITABLE_FIELDS};
use crate::policy::Categories;

/// Per-course scope depth
#[derive(Debug, Default)]
pub(crate) struct BulkState {
    depth: usize,
    dirty: bool,
}

/// Guard for a bulk-operation scope; see [`ModuleStore::bulk_operations`]
#[must_use = "the scope ends when the guard is dropped"]
#[derive(Debug)]
pub struct BulkOperation<'a> {
    store: &'a ModuleStore,
    course_key: CourseKey,
}

impl BulkOperation<'_> {
    /// Course this scope covers
    pub fn course_key(&self) -> &CourseKey {
        &self.course_key
    }
}

impl Drop for BulkOperation<'_> {
    fn drop(&mut self) {
        let finished = match self.store.bulk.get_mut(&self.course_key) {
            Some(mut scope) => {
                scope.depth = scope.depth.saturating_sub(1);
                (scope.depth == 0).then_some(scope.dirty)
            }
            None => None,
        };
        let Some(dirty) = finished else {
            return;
        };
        self.store
            .bulk
            .remove_if(&self.course_key, |_, scope| scope.depth == 0);
        debug!(course = %self.course_key, dirty, "Bulk operation finished");
        if dirty {
            if let Some(handle) = self.store.courses.get(&self.course_key) {
                let mut state = handle.write();
                if state.derived.is_dirty() {
                    self.store.recompute(&mut state);
                }
            }
        }
    }
}

impl ModuleStore {
    /// Open a bulk-operation scope for a course
    ///
    /// Derived metadata is recomputed once, when the outermost scope's
    /// guard is dropped. Reads inside the scope still see current data:
    /// derived queries fall back to computing on demand while dirty.
    ///
    /// # Example
    ///
    /// ```text
    /// {
    ///     let _bulk = store.bulk_operations(&course_key);
    ///     for i in 0..100 {
    ///         store.create_child(&user, &parent, "html", None)?;
    ///     }
    /// } // one recomputation here
    /// ```
    pub fn bulk_operations(&self, course_key: &CourseKey) -> BulkOperation<'_> {
        let depth = {
            let mut scope = self.bulk.entry(course_key.clone()).or_default();
            scope.depth += 1;
            scope.depth
        };
        debug!(course = %course_key, depth, "Bulk operation started");
        BulkOperation {
            store: self,
            course_key: course_key.clone(),
        }
    }

    /// True while a bulk-operation scope is open for the course
    pub fn in_bulk_operation(&self, course_key: &CourseKey) -> bool {
        self.bulk
            .get(course_key)
            .is_some_and(|scope| scope.depth > 0)
    }

    /// Recompute now, or defer to the end of an open scope
    pub(crate) fn after_write(&self, course_key: &CourseKey, state: &mut CourseState) {
        let deferred = match self.bulk.get_mut(course_key) {
            Some(mut scope) if scope.depth > 0 => {
                scope.dirty = true;
                true
            }
            _ => false,
        };
        if deferred {
            state.derived.mark_dirty();
        } else {
            self.recompute(state);
        }
    }

    pub(crate) fn recompute(&self, state: &mut CourseState) {
        let has_changes = all_changes(state, &self.categories);
        let inherited = all_inherited(state);
        debug!(
            course = %state.course_key(),
            blocks = has_changes.len(),
            "Recomputed derived metadata"
        );
        state.derived.replace(has_changes, inherited);
        self.metrics.record_recomputation();
    }
}

// ============================================================================
// Derived metadata
// ============================================================================

/// Own change flag, ignoring descendants
fn changed_itself(state: &CourseState, categories: &Categories, key: &BlockKey) -> bool {
    if categories.is_direct_only(&key.block_type) {
        return false;
    }
    state.has_draft(key) || !state.is_published(key)
}

fn changes_memo(
    state: &CourseState,
    categories: &Categories,
    key: &BlockKey,
    memo: &mut HashMap<BlockKey, bool>,
    visiting: &mut HashSet<BlockKey>,
) -> bool {
    if let Some(known) = memo.get(key) {
        return *known;
    }
    if !visiting.insert(key.clone()) {
        return false;
    }
    let mut changed = changed_itself(state, categories, key);
    if let Some(block) = state.draft_view(key) {
        for child in &block.children {
            if state.draft_view(child).is_none() {
                continue;
            }
            // Evaluate every child so the memo covers the whole subtree
            if changes_memo(state, categories, child, memo, visiting) {
                changed = true;
            }
        }
    }
    visiting.remove(key);
    memo.insert(key.clone(), changed);
    changed
}

/// Has-changes flag of every block in the draft view
pub(crate) fn all_changes(state: &CourseState, categories: &Categories) -> HashMap<BlockKey, bool> {
    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    for key in state.view_keys(Branch::Draft) {
        changes_memo(state, categories, &key, &mut memo, &mut visiting);
    }
    memo
}

/// Has-changes flag of one block, computed on demand
pub(crate) fn changes_for(state: &CourseState, categories: &Categories, key: &BlockKey) -> bool {
    changes_memo(state, categories, key, &mut HashMap::new(), &mut HashSet::new())
}

fn inheritable(fields: &Fields) -> impl Iterator<Item = (&String, &serde_json::Value)> {
    fields
        .iter()
        .filter(|(name, _)| INHERITABLE_FIELDS.contains(&name.as_str()))
}

/// Inherited fields of every block reachable from the root
pub(crate) fn all_inherited(state: &CourseState) -> HashMap<BlockKey, Fields> {
    let mut out: HashMap<BlockKey, Fields> = HashMap::new();
    out.insert(state.root().clone(), Fields::new());
    for key in state.subtree(state.root(), Branch::Draft) {
        let Some(block) = state.draft_view(&key) else {
            continue;
        };
        let mut passed = out.get(&key).cloned().unwrap_or_default();
        for (name, value) in inheritable(&block.fields) {
            passed.insert(name.clone(), value.clone());
        }
        for child in &block.children {
            out.entry(child.clone()).or_insert_with(|| passed.clone());
        }
    }
    out
}

/// Inherited fields of one block, from its draft-view ancestors
pub(crate) fn inherited_for(state: &CourseState, key: &BlockKey) -> Fields {
    let mut out = Fields::new();
    for ancestor in state.ancestors(key, Branch::Draft) {
        let Some(block) = state.draft_view(&ancestor) else {
            continue;
        };
        for (name, value) in inheritable(&block.fields) {
            out.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::BackendPolicy;
    use coursestore_core::{UsageKey, UserId};
    use serde_json::json;

    fn user() -> UserId {
        UserId::from(-3)
    }

    fn course(store: &ModuleStore) -> UsageKey {
        store
            .create_course("org", "bulk", "run", &user())
            .unwrap()
            .location
    }

    #[test]
    fn test_writes_recompute_outside_scope() {
        let store = ModuleStore::with_policy(BackendPolicy::direct());
        let root = course(&store);
        let before = store.metrics().recomputations;
        store
            .create_child(&user(), &root, "chapter", Some("a"))
            .unwrap();
        store
            .create_child(&user(), &root, "chapter", Some("b"))
            .unwrap();
        assert_eq!(store.metrics().recomputations, before + 2);
    }

    #[test]
    fn test_scope_coalesces_recomputation() {
        let store = ModuleStore::with_policy(BackendPolicy::direct());
        let root = course(&store);
        let before = store.metrics().recomputations;
        let chapter;
        {
            let _bulk = store.bulk_operations(&root.course);
            assert!(store.in_bulk_operation(&root.course));
            chapter = store
                .create_child(&user(), &root, "chapter", Some("a"))
                .unwrap()
                .location;
            let v = store
                .create_child(&user(), &chapter, "vertical", Some("v"))
                .unwrap()
                .location;
            // Derived reads are still correct while deferred
            assert!(store.has_changes(&v).unwrap());
            assert!(store.has_changes(&chapter).unwrap());
            assert_eq!(store.metrics().recomputations, before);
        }
        assert!(!store.in_bulk_operation(&root.course));
        assert_eq!(store.metrics().recomputations, before + 1);
        assert!(store.has_changes(&chapter).unwrap());
    }

    #[test]
    fn test_nested_scopes_recompute_once() {
        let store = ModuleStore::with_policy(BackendPolicy::direct());
        let root = course(&store);
        let before = store.metrics().recomputations;
        {
            let _outer = store.bulk_operations(&root.course);
            {
                let _inner = store.bulk_operations(&root.course);
                store
                    .create_child(&user(), &root, "chapter", Some("a"))
                    .unwrap();
            }
            assert!(store.in_bulk_operation(&root.course));
            assert_eq!(store.metrics().recomputations, before);
            store
                .create_child(&user(), &root, "chapter", Some("b"))
                .unwrap();
        }
        assert_eq!(store.metrics().recomputations, before + 1);
    }

    #[test]
    fn test_empty_scope_skips_recomputation() {
        let store = ModuleStore::with_policy(BackendPolicy::direct());
        let root = course(&store);
        let before = store.metrics().recomputations;
        drop(store.bulk_operations(&root.course));
        assert_eq!(store.metrics().recomputations, before);
    }

    #[test]
    fn test_inherited_fields_cached_and_on_demand_agree() {
        let store = ModuleStore::with_policy(BackendPolicy::direct());
        let root = course(&store);
        let mut course_item = store.get_item(&root).unwrap();
        course_item.set_field("start", json!("2030-01-01T00:00:00Z"));
        store.update_item(&course_item, &user()).unwrap();

        let chapter = store
            .create_child(&user(), &root, "chapter", Some("a"))
            .unwrap()
            .location;
        let mut chapter_item = store.get_item(&chapter).unwrap();
        chapter_item.set_field("graded", json!(true));
        store.update_item(&chapter_item, &user()).unwrap();
        let v = store
            .create_child(&user(), &chapter, "vertical", Some("v"))
            .unwrap()
            .location;

        let cached = store.inherited_fields(&v).unwrap();
        assert_eq!(cached.get("start"), Some(&json!("2030-01-01T00:00:00Z")));
        assert_eq!(cached.get("graded"), Some(&json!(true)));

        let _bulk = store.bulk_operations(&root.course);
        let mut chapter_item = store.get_item(&chapter).unwrap();
        chapter_item.set_field("graded", json!(false));
        store.update_item(&chapter_item, &user()).unwrap();
        let on_demand = store.inherited_fields(&v).unwrap();
        assert_eq!(on_demand.get("graded"), Some(&json!(false)));
        assert!(store.inherited_fields(&root).unwrap().is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Create(usize),
            Publish(usize),
            Move(usize, usize),
            Delete(usize),
            Grade(usize, bool),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0..3usize).prop_map(Op::Create),
                (0..3usize).prop_map(Op::Publish),
                (0..8usize, 0..3usize).prop_map(|(h, v)| Op::Move(h, v)),
                (0..8usize).prop_map(Op::Delete),
                (0..3usize, any::<bool>()).prop_map(|(v, g)| Op::Grade(v, g)),
            ]
        }

        fn build() -> (ModuleStore, UsageKey) {
            let store = ModuleStore::with_policy(BackendPolicy::direct());
            let root = course(&store);
            let seq = store
                .create_child(&user(), &root, "sequential", Some("s"))
                .unwrap()
                .location;
            for v in 0..3 {
                store
                    .create_child(&user(), &seq, "vertical", Some(&format!("v{}", v)))
                    .unwrap();
            }
            (store, root)
        }

        /// Apply one op; failures (missing blocks) are ignored
        fn apply(store: &ModuleStore, root: &UsageKey, created: &mut usize, op: &Op) {
            let vertical = |v: usize| root.course.make_usage_key("vertical", &format!("v{}", v));
            let html = |h: usize| root.course.make_usage_key("html", &format!("h{}", h));
            let _ = match op {
                Op::Create(v) => {
                    let id = format!("h{}", *created);
                    *created += 1;
                    store
                        .create_child(&user(), &vertical(*v), "html", Some(&id))
                        .map(|_| ())
                }
                Op::Publish(v) => store.publish(&vertical(*v), &user()).map(|_| ()),
                Op::Move(h, v) => store.move_item(&html(*h), &vertical(*v), None, &user()),
                Op::Delete(h) => store.delete_item(&html(*h), &user()),
                Op::Grade(v, graded) => store.get_item(&vertical(*v)).and_then(|mut item| {
                    item.set_field("graded", json!(graded));
                    store.update_item(&item, &user()).map(|_| ())
                }),
            };
        }

        proptest! {
            #[test]
            fn bulk_scope_matches_per_write_recompute(ops in prop::collection::vec(op(), 1..30)) {
                let (eager, eager_root) = build();
                let (bulk, bulk_root) = build();
                let (mut a, mut b) = (0, 0);
                for op in &ops {
                    apply(&eager, &eager_root, &mut a, op);
                }
                {
                    let _scope = bulk.bulk_operations(&bulk_root.course);
                    for op in &ops {
                        apply(&bulk, &bulk_root, &mut b, op);
                    }
                }
                let keys = eager
                    .get_items(&eager_root.course, coursestore_core::RevisionOption::DraftPreferred, None)
                    .unwrap();
                for item in keys {
                    let key = &item.location;
                    prop_assert!(bulk.has_item(key));
                    prop_assert_eq!(eager.has_changes(key).unwrap(), bulk.has_changes(key).unwrap());
                    prop_assert_eq!(
                        eager.inherited_fields(key).unwrap(),
                        bulk.inherited_fields(key).unwrap()
                    );
                }
            }
        }
    }
}
