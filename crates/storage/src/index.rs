//! Child → parent index
//!
//! Parent → child linkage lives in each block's ordered child list. Looking
//! a parent up by scanning every block is O(n) and easy to get wrong after a
//! move, so each block table keeps this index and updates it in the same
//! call that replaces or removes a block.

use coursestore_core::BlockKey;
use std::collections::HashMap;

/// Secondary index: child BlockKey → parent BlockKey
#[derive(Debug, Default, Clone)]
pub struct ParentIndex {
    index: HashMap<BlockKey, BlockKey>,
}

impl ParentIndex {
    /// Create a new empty ParentIndex
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
        }
    }

    /// Record that `parent` lists `child`
    ///
    /// Returns the previous parent if the child was already attached to a
    /// different one. The caller decides whether that is an error.
    pub fn attach(&mut self, child: BlockKey, parent: BlockKey) -> Option<BlockKey> {
        match self.index.insert(child, parent.clone()) {
            Some(prev) if prev != parent => Some(prev),
            _ => None,
        }
    }

    /// Forget that `parent` lists `child`
    ///
    /// Only removes the entry while it still points at `parent`, so a child
    /// that was re-attached elsewhere keeps its newer parent. Returns true if
    /// the entry was removed.
    pub fn detach(&mut self, child: &BlockKey, parent: &BlockKey) -> bool {
        if self.index.get(child) == Some(parent) {
            self.index.remove(child);
            true
        } else {
            false
        }
    }

    /// Parent of `child`, if any
    pub fn get(&self, child: &BlockKey) -> Option<&BlockKey> {
        self.index.get(child)
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of attached children
    pub fn len(&self) -> usize {
        self.index.len()
    }
}
