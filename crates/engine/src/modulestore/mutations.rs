//! Create, update, move, and delete
//!
//! Every mutation writes through the draft view: a block of a direct-only
//! type is written to the published layer, any other block gets a draft
//! revision. Attaching a child to a new parent always detaches it from its
//! current draft-view parent first, so a block is listed by at most one
//! parent in the draft view.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use coursestore_core::{
    Block, BlockKey, Branch, CourseKey, Error, Fields, Result, RevisionOption, UsageKey, UserId,
};
use coursestore_storage::CourseState;

use super::{Item, ModuleStore, ROOT_BLOCK_ID};
use crate::policy::Categories;

/// Options for [`ModuleStore::create_item`]
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Parent to attach the new block to
    pub parent: Option<UsageKey>,
    /// Position among the parent's children; appended when `None`
    pub index: Option<usize>,
    /// Initial fields
    pub fields: Fields,
    /// Initial data body
    pub data: Option<String>,
}

impl CreateOptions {
    /// Attach under `parent`
    pub fn under(parent: &UsageKey) -> Self {
        Self {
            parent: Some(parent.clone()),
            ..Self::default()
        }
    }

    /// Insert at `index` in the parent's child list
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Set a field
    pub fn field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Set the data body
    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

// ============================================================================
// Editor
// ============================================================================

/// Draft-view write helpers over one locked course
pub(crate) struct Editor<'a> {
    pub(crate) state: &'a mut CourseState,
    categories: &'a Categories,
    user: &'a UserId,
}

impl<'a> Editor<'a> {
    pub(crate) fn new(
        state: &'a mut CourseState,
        categories: &'a Categories,
        user: &'a UserId,
    ) -> Self {
        Self {
            state,
            categories,
            user,
        }
    }

    pub(crate) fn is_direct_only(&self, key: &BlockKey) -> bool {
        self.categories.is_direct_only(&key.block_type)
    }

    fn not_found(&self, key: &BlockKey) -> Error {
        Error::not_found(self.state.course_key().usage_key(key))
    }

    /// Clone of the draft-view revision
    pub(crate) fn view_block(&self, key: &BlockKey) -> Result<Block> {
        self.state
            .draft_view(key)
            .cloned()
            .ok_or_else(|| self.not_found(key))
    }

    /// Store a block as its new draft-view revision
    ///
    /// A draftable block whose content matches its published revision
    /// keeps no draft.
    pub(crate) fn write_view(&mut self, mut block: Block) {
        block.edit_info.touch(self.user);
        if self.is_direct_only(&block.key) {
            block.edit_info.mark_published(self.user);
            self.state.remove_draft(&block.key);
            self.state.clear_tombstone(&block.key);
            self.state.put_published(block);
        } else if self
            .state
            .published(&block.key)
            .is_some_and(|published| published.same_content(&block))
        {
            self.state.remove_draft(&block.key);
            self.state.clear_tombstone(&block.key);
        } else {
            self.state.put_draft(block);
        }
    }

    /// Remove `child` from its draft-view parent's child list
    ///
    /// Returns the former parent and position, if the block had one.
    pub(crate) fn detach(&mut self, child: &BlockKey) -> Result<Option<(BlockKey, usize)>> {
        let Some(parent_key) = self.state.draft_parent(child).cloned() else {
            return Ok(None);
        };
        let mut parent = self.view_block(&parent_key)?;
        let Some(index) = parent.child_index(child) else {
            return Ok(None);
        };
        parent.remove_child(child);
        self.write_view(parent);
        Ok(Some((parent_key, index)))
    }

    /// Insert `child` into `parent`'s child list
    ///
    /// The caller detaches the child from any other parent first.
    pub(crate) fn attach(
        &mut self,
        parent_key: &BlockKey,
        child: &BlockKey,
        index: Option<usize>,
    ) -> Result<()> {
        let mut parent = self.view_block(parent_key)?;
        parent.remove_child(child);
        parent.insert_child(child.clone(), index);
        self.write_view(parent);
        Ok(())
    }

    /// True if `candidate` is `key` or one of its draft-view ancestors
    pub(crate) fn is_self_or_ancestor(&self, candidate: &BlockKey, key: &BlockKey) -> bool {
        candidate == key || self.state.ancestors(key, Branch::Draft).contains(candidate)
    }
}

// ============================================================================
// Mutations
// ============================================================================

impl ModuleStore {
    /// Create a course with an empty root block
    ///
    /// The root has type `course` and id `course`, and is auto-published.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for malformed components and `DuplicateItem` if
    /// the course exists.
    pub fn create_course(&self, org: &str, course: &str, run: &str, user: &UserId) -> Result<Item> {
        let course_key = CourseKey::new(org, course, run)?;
        let mut root = Block::new(BlockKey::new("course", ROOT_BLOCK_ID), user);
        root.edit_info.mark_published(user);
        let mut state = CourseState::new(course_key.clone(), root);
        self.after_write(&course_key, &mut state);
        let handle = self.courses.insert(state)?;
        self.metrics.record_write();
        info!(course = %course_key, user = %user, "Created course");
        let state = handle.read();
        Self::item(&state, state.root(), RevisionOption::DraftPreferred)
    }

    /// Create a block, optionally attached to a parent
    ///
    /// A random id is generated when `block_id` is `None`.
    ///
    /// # Errors
    ///
    /// - `DuplicateItem` if the key exists in the draft view
    /// - `ItemNotFound` if the course or parent is missing
    /// - `InvalidState` if the parent belongs to another course
    pub fn create_item(
        &self,
        user: &UserId,
        course_key: &CourseKey,
        block_type: &str,
        block_id: Option<&str>,
        options: CreateOptions,
    ) -> Result<Item> {
        let block_id = block_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let key = BlockKey::validated(block_type, &block_id)?;
        if let Some(parent) = &options.parent {
            if parent.course != *course_key {
                return Err(Error::invalid_state(format!(
                    "parent {} is not in course {}",
                    parent, course_key
                )));
            }
        }

        let item = self.write(course_key, |state| {
            if state.draft_view(&key).is_some() {
                return Err(Error::DuplicateItem(course_key.usage_key(&key).to_string()));
            }
            if let Some(parent) = &options.parent {
                if state.draft_view(&parent.block).is_none() {
                    return Err(Error::not_found(parent));
                }
            }
            let mut editor = Editor::new(state, &self.categories, user);
            let block = Block::new(key.clone(), user)
                .with_fields(options.fields)
                .with_data(options.data);
            editor.write_view(block);
            if let Some(parent) = &options.parent {
                editor.attach(&parent.block, &key, options.index)?;
            }
            Self::item(editor.state, &key, RevisionOption::DraftPreferred)
        })?;
        debug!(location = %item.location, user = %user, "Created item");
        Ok(item)
    }

    /// Create a block appended to `parent`'s children
    pub fn create_child(
        &self,
        user: &UserId,
        parent: &UsageKey,
        block_type: &str,
        block_id: Option<&str>,
    ) -> Result<Item> {
        self.create_item(
            user,
            &parent.course,
            block_type,
            block_id,
            CreateOptions::under(parent),
        )
    }

    /// Write an item's fields, data, and child list
    ///
    /// Children newly listed are detached from their previous parent.
    /// Children no longer listed lose their parent link and become orphans
    /// in the draft view unless another parent lists them.
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` if the item or a listed child is missing
    /// - `InvalidState` if a child is listed twice, belongs to another
    ///   course, or would create a cycle
    pub fn update_item(&self, item: &Item, user: &UserId) -> Result<Item> {
        let location = &item.location;
        let course_key = &location.course;
        let key = location.block.clone();
        for child in &item.children {
            if child.course != *course_key {
                return Err(Error::invalid_state(format!(
                    "child {} is not in course {}",
                    child, course_key
                )));
            }
        }
        let children: Vec<BlockKey> = item.children.iter().map(|c| c.block.clone()).collect();

        let updated = self.write(course_key, |state| {
            let existing = state
                .draft_view(&key)
                .cloned()
                .ok_or_else(|| Error::not_found(location))?;

            let mut seen = HashSet::new();
            for child in &children {
                if !seen.insert(child) {
                    return Err(Error::invalid_state(format!(
                        "{} is listed twice",
                        course_key.usage_key(child)
                    )));
                }
                if state.draft_view(child).is_none() {
                    return Err(Error::not_found(course_key.usage_key(child)));
                }
            }

            let mut editor = Editor::new(state, &self.categories, user);
            for child in &children {
                if editor.is_self_or_ancestor(child, &key) {
                    return Err(Error::invalid_state(format!(
                        "{} can not be a child of its own descendant {}",
                        course_key.usage_key(child),
                        location
                    )));
                }
            }
            for child in &children {
                if existing.has_child(child) {
                    continue;
                }
                if editor.state.draft_parent(child).is_some_and(|p| *p != key) {
                    editor.detach(child)?;
                }
            }

            let mut block = existing;
            block.fields = item.fields.clone();
            block.data = item.data.clone();
            block.children = children;
            editor.write_view(block);
            Self::item(editor.state, &key, RevisionOption::DraftPreferred)
        })?;
        debug!(location = %location, user = %user, "Updated item");
        Ok(updated)
    }

    /// Move a block under a new parent at `index` (appended when `None`)
    ///
    /// Moving within the same parent reorders it.
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` if the block or new parent is missing
    /// - `InvalidState` for the course root, a cross-course move, or a move
    ///   under the block's own subtree
    pub fn move_item(
        &self,
        location: &UsageKey,
        new_parent: &UsageKey,
        index: Option<usize>,
        user: &UserId,
    ) -> Result<()> {
        let course_key = &location.course;
        if new_parent.course != *course_key {
            return Err(Error::invalid_state(format!(
                "can not move {} to another course",
                location
            )));
        }
        let key = &location.block;
        let parent = &new_parent.block;

        self.write(course_key, |state| {
            if state.draft_view(key).is_none() {
                return Err(Error::not_found(location));
            }
            if state.draft_view(parent).is_none() {
                return Err(Error::not_found(new_parent));
            }
            if key == state.root() {
                return Err(Error::invalid_state("the course root can not be moved"));
            }
            let mut editor = Editor::new(state, &self.categories, user);
            if editor.is_self_or_ancestor(key, parent) {
                return Err(Error::invalid_state(format!(
                    "can not move {} under its own subtree",
                    location
                )));
            }
            editor.detach(key)?;
            editor.attach(parent, key, index)
        })?;
        debug!(location = %location, parent = %new_parent, user = %user, "Moved item");
        Ok(())
    }

    /// Delete a block and its draft-view subtree
    ///
    /// Published blocks under a draftable parent stay live until that parent
    /// is published; they are hidden from the draft view meanwhile. Under a
    /// direct-only parent the change is live at once, so those blocks are
    /// removed from both branches.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` if missing; `InvalidState` for the course root.
    pub fn delete_item(&self, location: &UsageKey, user: &UserId) -> Result<()> {
        let key = &location.block;
        let removed = self.write(&location.course, |state| {
            if state.draft_view(key).is_none() {
                return Err(Error::not_found(location));
            }
            if key == state.root() {
                return Err(Error::invalid_state("the course root can not be deleted"));
            }
            let subtree = state.subtree(key, Branch::Draft);
            let mut editor = Editor::new(state, &self.categories, user);
            let former_parent = editor.detach(key)?;
            let live = editor.is_direct_only(key)
                || former_parent
                    .as_ref()
                    .map_or(true, |(parent, _)| editor.is_direct_only(parent));
            for node in &subtree {
                // A published block no published parent lists would never be
                // pruned by a later publish
                let unlisted = editor.state.parent(node, Branch::Published).is_none();
                if live || unlisted || editor.is_direct_only(node) {
                    editor.state.purge(node);
                } else {
                    editor.state.tombstone(node);
                }
            }
            Ok(subtree.len())
        })?;
        info!(location = %location, user = %user, removed, "Deleted item");
        Ok(())
    }
}
