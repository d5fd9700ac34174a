//! CourseState: both branch layers of one course
//!
//! The published layer holds every published revision. The draft layer holds
//! only revisions that differ from published (or were never published), plus
//! pending-deletion tombstones for published blocks deleted in the draft view.
//!
//! # Draft View
//!
//! Reading through the draft view returns, per block:
//! - nothing if the block is tombstoned
//! - the draft revision if one exists
//! - otherwise the published revision
//!
//! A block's parent in the draft view is the draft revision listing it, or
//! else a published parent that has no draft revision of its own (a parent
//! with a draft revision is authoritative for its child list).

use std::collections::{BTreeSet, HashMap, HashSet};

use coursestore_core::{Block, BlockKey, Branch, CourseKey, Fields, RevisionOption};

use crate::table::BlockTable;

/// Metadata derived from the draft view, recomputed after writes
///
/// Inside a bulk-operation scope the engine marks this dirty instead of
/// recomputing; readers must check [`DerivedMetadata::is_dirty`].
#[derive(Debug, Default, Clone)]
pub struct DerivedMetadata {
    /// Block → true if it or a descendant has unpublished changes
    pub has_changes: HashMap<BlockKey, bool>,
    /// Block → inheritable fields resolved from its ancestors
    pub inherited: HashMap<BlockKey, Fields>,
    dirty: bool,
}

impl DerivedMetadata {
    /// True when a write happened after the last recomputation
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark stale
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Replace with freshly computed values
    pub fn replace(&mut self, has_changes: HashMap<BlockKey, bool>, inherited: HashMap<BlockKey, Fields>) {
        self.has_changes = has_changes;
        self.inherited = inherited;
        self.dirty = false;
    }
}

/// All state of one course
#[derive(Debug, Clone)]
pub struct CourseState {
    course_key: CourseKey,
    root: BlockKey,
    published: BlockTable,
    draft: BlockTable,
    tombstones: BTreeSet<BlockKey>,
    /// Derived draft-view metadata
    pub derived: DerivedMetadata,
    version: u64,
}

impl CourseState {
    /// New course whose root block is already built
    ///
    /// The root is placed on the published layer.
    pub fn new(course_key: CourseKey, root: Block) -> Self {
        let root_key = root.key.clone();
        let mut published = BlockTable::new();
        published.put(root);
        let mut state = Self {
            course_key,
            root: root_key,
            published,
            draft: BlockTable::new(),
            tombstones: BTreeSet::new(),
            derived: DerivedMetadata::default(),
            version: 0,
        };
        state.derived.mark_dirty();
        state
    }

    /// The course key
    pub fn course_key(&self) -> &CourseKey {
        &self.course_key
    }

    /// The root block key
    pub fn root(&self) -> &BlockKey {
        &self.root
    }

    /// Monotonic write counter for this course
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advance the write counter
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a block through the given revision option
    pub fn get(&self, key: &BlockKey, revision: RevisionOption) -> Option<&Block> {
        match revision {
            RevisionOption::DraftPreferred => self.draft_view(key),
            RevisionOption::DraftOnly => self.draft.get(key),
            RevisionOption::PublishedOnly => self.published.get(key),
        }
    }

    /// Read a block through a branch view
    pub fn get_in(&self, key: &BlockKey, branch: Branch) -> Option<&Block> {
        self.get(key, branch.into())
    }

    /// Draft view of a block
    pub fn draft_view(&self, key: &BlockKey) -> Option<&Block> {
        if self.tombstones.contains(key) {
            return None;
        }
        self.draft.get(key).or_else(|| self.published.get(key))
    }

    /// Published revision of a block
    pub fn published(&self, key: &BlockKey) -> Option<&Block> {
        self.published.get(key)
    }

    /// True if a draft revision exists
    pub fn has_draft(&self, key: &BlockKey) -> bool {
        self.draft.contains(key)
    }

    /// True if a published revision exists
    pub fn is_published(&self, key: &BlockKey) -> bool {
        self.published.contains(key)
    }

    /// True if the block is pending deletion in the draft view
    pub fn is_tombstoned(&self, key: &BlockKey) -> bool {
        self.tombstones.contains(key)
    }

    /// Number of pending deletions
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Parent of a block in the draft view
    pub fn draft_parent(&self, key: &BlockKey) -> Option<&BlockKey> {
        if let Some(parent) = self.draft.parent_of(key) {
            return Some(parent);
        }
        self.published
            .parent_of(key)
            .filter(|p| !self.draft.contains(p) && !self.tombstones.contains(*p))
    }

    /// Parent of a block in a branch view
    pub fn parent(&self, key: &BlockKey, branch: Branch) -> Option<&BlockKey> {
        match branch {
            Branch::Draft => self.draft_parent(key),
            Branch::Published => self.published.parent_of(key),
        }
    }

    /// All keys visible in a branch view, in key order
    pub fn view_keys(&self, branch: Branch) -> Vec<BlockKey> {
        match branch {
            Branch::Published => self.published.keys().cloned().collect(),
            Branch::Draft => {
                let keys: BTreeSet<&BlockKey> = self
                    .draft
                    .keys()
                    .chain(self.published.keys())
                    .filter(|k| !self.tombstones.contains(*k))
                    .collect();
                keys.into_iter().cloned().collect()
            }
        }
    }

    /// Keys of draft revisions, in key order
    pub fn draft_keys(&self) -> Vec<BlockKey> {
        self.draft.keys().cloned().collect()
    }

    /// Pre-order subtree of `key` in a branch view, `key` first
    ///
    /// Children missing from the view are skipped. Each block is visited at
    /// most once, so a corrupted child list can not loop forever.
    pub fn subtree(&self, key: &BlockKey, branch: Branch) -> Vec<BlockKey> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![key.clone()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            let Some(block) = self.get_in(&next, branch) else {
                continue;
            };
            for child in block.children.iter().rev() {
                stack.push(child.clone());
            }
            out.push(next);
        }
        out
    }

    /// Ancestors of `key` in a branch view, nearest first
    pub fn ancestors(&self, key: &BlockKey, branch: Branch) -> Vec<BlockKey> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = key.clone();
        while let Some(parent) = self.parent(&current, branch) {
            if !seen.insert(parent.clone()) {
                break;
            }
            out.push(parent.clone());
            current = parent.clone();
        }
        out
    }

    /// Keys reachable from the root in a branch view
    pub fn reachable(&self, branch: Branch) -> HashSet<BlockKey> {
        self.subtree(&self.root, branch).into_iter().collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a draft revision, clearing any tombstone
    pub fn put_draft(&mut self, block: Block) -> Option<Block> {
        self.tombstones.remove(&block.key);
        self.draft.put(block)
    }

    /// Write a published revision
    pub fn put_published(&mut self, block: Block) -> Option<Block> {
        self.published.put(block)
    }

    /// Drop a draft revision
    pub fn remove_draft(&mut self, key: &BlockKey) -> Option<Block> {
        self.draft.remove(key)
    }

    /// Drop a published revision
    pub fn remove_published(&mut self, key: &BlockKey) -> Option<Block> {
        self.published.remove(key)
    }

    /// Hide a block from the draft view until its parent is republished
    ///
    /// Drops the draft revision. No-op for blocks that were never published.
    pub fn tombstone(&mut self, key: &BlockKey) {
        self.draft.remove(key);
        if self.published.contains(key) {
            self.tombstones.insert(key.clone());
        }
    }

    /// Forget a pending deletion
    pub fn clear_tombstone(&mut self, key: &BlockKey) -> bool {
        self.tombstones.remove(key)
    }

    /// Drop every trace of a block from both layers
    pub fn purge(&mut self, key: &BlockKey) {
        self.draft.remove(key);
        self.published.remove(key);
        self.tombstones.remove(key);
    }
}
