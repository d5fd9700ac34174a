//! Content blocks
//!
//! A block is one node of a course tree: a payload (named fields plus an
//! optional raw data body) and an ordered list of child identities. The
//! parent link is not stored on the block; storage keeps an explicit
//! child → parent index next to the child lists.

use crate::keys::{BlockKey, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named block fields ("display_name", "due", ...)
pub type Fields = BTreeMap<String, Value>;

/// Who changed a revision and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInfo {
    /// User that produced this revision
    pub edited_by: UserId,
    /// When this revision was produced
    pub edited_on: DateTime<Utc>,
    /// User that last published the block, if ever
    pub published_by: Option<UserId>,
    /// When the block was last published, if ever
    pub published_on: Option<DateTime<Utc>>,
}

impl EditInfo {
    /// Fresh edit info for a revision written now
    pub fn new(user: &UserId) -> Self {
        Self {
            edited_by: user.clone(),
            edited_on: Utc::now(),
            published_by: None,
            published_on: None,
        }
    }

    /// Record an edit, keeping publish information
    pub fn touch(&mut self, user: &UserId) {
        self.edited_by = user.clone();
        self.edited_on = Utc::now();
    }

    /// Record a publish
    pub fn mark_published(&mut self, user: &UserId) {
        self.published_by = Some(user.clone());
        self.published_on = Some(Utc::now());
    }
}

/// One revision of a block on one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Course-relative identity
    pub key: BlockKey,
    /// Named fields
    pub fields: Fields,
    /// Raw body (html source, problem xml, ...)
    pub data: Option<String>,
    /// Ordered child identities
    pub children: Vec<BlockKey>,
    /// Revision attribution
    pub edit_info: EditInfo,
}

impl Block {
    /// New childless block with no fields
    pub fn new(key: BlockKey, user: &UserId) -> Self {
        Self {
            key,
            fields: Fields::new(),
            data: None,
            children: Vec::new(),
            edit_info: EditInfo::new(user),
        }
    }

    /// Builder: set fields
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Builder: set the data body
    pub fn with_data(mut self, data: Option<String>) -> Self {
        self.data = data;
        self
    }

    /// Position of `child` in the child list
    pub fn child_index(&self, child: &BlockKey) -> Option<usize> {
        self.children.iter().position(|c| c == child)
    }

    /// True if `child` is listed
    pub fn has_child(&self, child: &BlockKey) -> bool {
        self.child_index(child).is_some()
    }

    /// Remove `child` from the list. Returns true if it was listed.
    pub fn remove_child(&mut self, child: &BlockKey) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c != child);
        self.children.len() != before
    }

    /// Insert `child` at `index` (clamped), or append when `None`
    pub fn insert_child(&mut self, child: BlockKey, index: Option<usize>) {
        match index {
            Some(i) => {
                let i = i.min(self.children.len());
                self.children.insert(i, child);
            }
            None => self.children.push(child),
        }
    }

    /// Same content, ignoring attribution
    pub fn same_content(&self, other: &Block) -> bool {
        self.key == other.key
            && self.fields == other.fields
            && self.data == other.data
            && self.children == other.children
    }

    /// Display name field, if set
    pub fn display_name(&self) -> Option<&str> {
        self.fields.get("display_name").and_then(Value::as_str)
    }
}
