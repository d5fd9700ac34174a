//! BlockTable: one branch layer of a course
//!
//! An ordered map from BlockKey to Block plus the child → parent index for
//! the child lists stored in that map. Blocks are only replaced through
//! [`BlockTable::put`] and [`BlockTable::remove`], so the index can never
//! drift from the child lists.
//!
//! A child may briefly be listed by two blocks of one layer (a move that has
//! reached the published layer through one parent only). The index then
//! points at the most recent lister, and falls back to the remaining one
//! when that listing goes away.

use std::collections::BTreeMap;

use coursestore_core::{Block, BlockKey};
use tracing::debug;

use crate::index::ParentIndex;

/// One branch layer: blocks plus their parent index
#[derive(Debug, Default, Clone)]
pub struct BlockTable {
    blocks: BTreeMap<BlockKey, Block>,
    parents: ParentIndex,
}

impl BlockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a block, updating the parent index
    ///
    /// Returns the replaced revision, if any.
    pub fn put(&mut self, block: Block) -> Option<Block> {
        let old = self.blocks.remove(&block.key);
        let mut dropped = Vec::new();
        if let Some(old) = &old {
            for child in &old.children {
                if self.parents.detach(child, &old.key) && !block.has_child(child) {
                    dropped.push(child.clone());
                }
            }
        }
        for child in &block.children {
            if let Some(prev) = self.parents.attach(child.clone(), block.key.clone()) {
                debug!(
                    child = %child,
                    previous = %prev,
                    parent = %block.key,
                    "child listed by two parents in one layer"
                );
            }
        }
        self.blocks.insert(block.key.clone(), block);
        self.reattach(&dropped);
        old
    }

    /// Remove a block, detaching its children in the index
    ///
    /// The removed block's own entry (as a child of its parent) stays until
    /// the parent's child list changes.
    pub fn remove(&mut self, key: &BlockKey) -> Option<Block> {
        let old = self.blocks.remove(key)?;
        let dropped: Vec<BlockKey> = old
            .children
            .iter()
            .filter(|child| self.parents.detach(child, &old.key))
            .cloned()
            .collect();
        self.reattach(&dropped);
        Some(old)
    }

    /// Point each unindexed child at another block still listing it
    fn reattach(&mut self, children: &[BlockKey]) {
        for child in children {
            if let Some(lister) = self.blocks.values().find(|b| b.has_child(child)) {
                self.parents.attach(child.clone(), lister.key.clone());
            }
        }
    }

    /// Get a block
    pub fn get(&self, key: &BlockKey) -> Option<&Block> {
        self.blocks.get(key)
    }

    /// Check presence
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    /// Parent listing `key` in this layer
    pub fn parent_of(&self, key: &BlockKey) -> Option<&BlockKey> {
        self.parents.get(key)
    }

    /// All keys in order
    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> {
        self.blocks.keys()
    }

    /// All blocks in key order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
