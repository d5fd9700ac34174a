//! Publish, unpublish, and revert
//!
//! Publishing copies the draft-view subtree of a block to the published
//! layer. When a published child list shrinks, the dropped children are
//! removed from the published layer too, unless the draft view still lists
//! them under another parent (the block was moved, not removed).

use tracing::{debug, info};

use coursestore_core::{Block, BlockKey, Branch, Error, Result, RevisionOption, UsageKey, UserId};
use coursestore_storage::CourseState;

use super::mutations::Editor;
use super::{Item, ModuleStore};
use crate::policy::{AutoPublishedUnpublish, ParentCheck};

/// Remove `root` and its published subtree from the published layer,
/// stopping at blocks the draft view still attaches somewhere
fn prune_published(state: &mut CourseState, root: &BlockKey) -> usize {
    let mut pruned = 0;
    let mut stack = vec![root.clone()];
    while let Some(key) = stack.pop() {
        let attached = state.draft_view(&key).is_some() && state.draft_parent(&key).is_some();
        if attached {
            continue;
        }
        state.clear_tombstone(&key);
        if let Some(removed) = state.remove_published(&key) {
            pruned += 1;
            stack.extend(removed.children);
        }
    }
    pruned
}

/// Insert a freshly published block into its parent's published revision
///
/// The position follows the draft-view order among siblings that are
/// already published.
fn link_into_published_parent(state: &mut CourseState, key: &BlockKey) {
    let Some(parent_key) = state.draft_parent(key).cloned() else {
        return;
    };
    let Some(view_parent) = state.draft_view(&parent_key) else {
        return;
    };
    let Some(published_parent) = state.published(&parent_key) else {
        return;
    };
    if published_parent.has_child(key) {
        return;
    }
    let index = view_parent
        .children
        .iter()
        .take_while(|c| *c != key)
        .filter(|c| published_parent.has_child(c))
        .count();
    let mut updated: Block = published_parent.clone();
    updated.insert_child(key.clone(), Some(index));
    state.put_published(updated);
}

impl ModuleStore {
    /// Publish a block and its draft-view subtree
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` if the block is missing from the draft view
    /// - `ItemNotFound` naming the first unpublished ancestor, when the
    ///   policy requires published ancestors
    pub fn publish(&self, location: &UsageKey, user: &UserId) -> Result<Item> {
        let key = &location.block;
        let policy = self.policy;
        let (item, published, pruned) = self.write(&location.course, |state| {
            if state.draft_view(key).is_none() {
                return Err(Error::not_found(location));
            }
            if policy.parent_check == ParentCheck::RequirePublishedAncestors {
                if let Some(missing) = state
                    .ancestors(key, Branch::Draft)
                    .into_iter()
                    .find(|a| !state.is_published(a))
                {
                    return Err(Error::not_found(location.course.usage_key(&missing)));
                }
            }

            let mut published = 0;
            let mut pruned = 0;
            for node in state.subtree(key, Branch::Draft) {
                if !state.has_draft(&node) && state.is_published(&node) {
                    continue;
                }
                let Some(mut block) = state.draft_view(&node).cloned() else {
                    continue;
                };
                block.edit_info.mark_published(user);
                state.remove_draft(&node);
                let previous = state.put_published(block.clone());
                published += 1;
                if let Some(previous) = previous {
                    for child in previous.children.iter().filter(|c| !block.has_child(c)) {
                        pruned += prune_published(state, child);
                    }
                }
            }
            if policy.parent_check == ParentCheck::RequirePublishedAncestors {
                link_into_published_parent(state, key);
            }
            let item = Self::item(state, key, RevisionOption::DraftPreferred)?;
            Ok((item, published, pruned))
        })?;
        self.metrics.record_publish();
        info!(location = %location, user = %user, published, pruned, "Published");
        Ok(item)
    }

    /// Withdraw a block and its published subtree from the published branch
    ///
    /// Draftable blocks keep their content as drafts; blocks pending
    /// deletion are dropped. For an auto-published block the policy decides
    /// between deleting it and refusing.
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` if the block has no published revision
    /// - `InvalidState` for the course root, or an auto-published block
    ///   when the policy rejects
    pub fn unpublish(&self, location: &UsageKey, user: &UserId) -> Result<()> {
        let key = &location.block;
        let policy = self.policy;
        self.write(&location.course, |state| {
            if !state.is_published(key) {
                return Err(Error::not_found(location));
            }
            if key == state.root() {
                return Err(Error::invalid_state("the course root can not be unpublished"));
            }

            let mut editor = Editor::new(state, &self.categories, user);
            if editor.is_direct_only(key) {
                return match policy.auto_published_unpublish {
                    AutoPublishedUnpublish::Reject => Err(Error::invalid_state(format!(
                        "{} is auto-published and has no draft to fall back to",
                        location
                    ))),
                    AutoPublishedUnpublish::Delete => {
                        editor.detach(key)?;
                        editor.state.purge(key);
                        debug!(location = %location, "Deleted auto-published block on unpublish");
                        Ok(())
                    }
                };
            }

            let state = editor.state;
            for node in state.subtree(key, Branch::Published) {
                if state.is_tombstoned(&node) {
                    state.clear_tombstone(&node);
                } else if !state.has_draft(&node) {
                    if let Some(mut block) = state.published(&node).cloned() {
                        block.edit_info.published_by = None;
                        block.edit_info.published_on = None;
                        state.put_draft(block);
                    }
                }
                state.remove_published(&node);
            }
            Ok(())
        })?;
        self.metrics.record_unpublish();
        info!(location = %location, user = %user, "Unpublished");
        Ok(())
    }

    /// Discard draft changes in a block's subtree
    ///
    /// Blocks that were never published are removed. Pending deletions are
    /// cancelled. Blocks moved into the subtree return to their published
    /// parent, and blocks moved out of it are taken back from their draft
    /// parent.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the block has no published revision.
    pub fn revert_to_published(&self, location: &UsageKey, user: &UserId) -> Result<Item> {
        let key = &location.block;
        let item = self.write(&location.course, |state| {
            if !state.is_published(key) {
                return Err(Error::invalid_state(format!(
                    "{} has no published version to revert to",
                    location
                )));
            }
            let draft_nodes = state.subtree(key, Branch::Draft);
            let published_nodes = state.subtree(key, Branch::Published);
            for node in draft_nodes.iter().chain(&published_nodes) {
                state.remove_draft(node);
                state.clear_tombstone(node);
            }

            let mut editor = Editor::new(state, &self.categories, user);
            for node in published_nodes.iter().filter(|n| *n != key) {
                let published_parent = editor.state.parent(node, Branch::Published).cloned();
                let draft_parent = editor.state.draft_parent(node).cloned();
                if draft_parent.is_some() && draft_parent != published_parent {
                    editor.detach(node)?;
                }
            }
            for node in draft_nodes.iter().filter(|n| *n != key) {
                if editor.state.draft_view(node).is_some() && editor.state.draft_parent(node).is_none() {
                    return_to_published_parent(&mut editor, node)?;
                }
            }
            Self::item(editor.state, key, RevisionOption::DraftPreferred)
        })?;
        info!(location = %location, user = %user, "Reverted to published");
        Ok(item)
    }
}

/// Relist `key` in the draft view of the parent whose published revision
/// lists it, at its published position among siblings still listed there
fn return_to_published_parent(editor: &mut Editor<'_>, key: &BlockKey) -> Result<()> {
    let Some(parent_key) = editor.state.parent(key, Branch::Published).cloned() else {
        return Ok(());
    };
    if editor.state.draft_view(&parent_key).is_none() {
        return Ok(());
    }
    let Some(published_parent) = editor.state.published(&parent_key) else {
        return Ok(());
    };
    let view_parent = editor.view_block(&parent_key)?;
    let index = published_parent
        .children
        .iter()
        .take_while(|c| *c != key)
        .filter(|c| view_parent.has_child(c))
        .count();
    editor.attach(&parent_key, key, Some(index))?;
    debug!(block = %key, parent = %parent_key, "Returned block to its published parent");
    Ok(())
}
