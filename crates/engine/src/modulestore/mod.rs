//! ModuleStore struct, construction, and read API
//!
//! The ModuleStore owns every course and runs the draft/publish state
//! machine over them:
//! - Reads go through a [`RevisionOption`] passed with each call
//! - Writes take the course write lock once and apply every change of the
//!   operation before releasing it
//! - Derived draft-view metadata is recomputed after each write, or once at
//!   the end of a bulk-operation scope (see [`BulkOperation`])
//!
//! Mutations live in `mutations.rs`, publish/unpublish in `publish.rs`, and
//! the bulk scope in `bulk.rs`.

pub mod config;
mod bulk;
pub(crate) mod mutations;
mod publish;

pub use bulk::BulkOperation;
pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use mutations::CreateOptions;

use std::path::Path;

use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use coursestore_core::{
    Block, BlockKey, Branch, CourseKey, EditInfo, Error, Fields, PublishState, Result,
    RevisionOption, UsageKey,
};
use coursestore_storage::{CourseHandle, CourseState, CourseTable};

use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::policy::{BackendPolicy, Categories};
use crate::settings::SettingsSchema;

use bulk::BulkState;

/// Fields a block inherits from its nearest ancestor that sets them.
pub const INHERITABLE_FIELDS: [&str; 6] = [
    "start",
    "due",
    "graded",
    "format",
    "visible_to_staff_only",
    "showanswer",
];

/// Block id of every course root.
pub const ROOT_BLOCK_ID: &str = "course";

// ============================================================================
// Item
// ============================================================================

/// A block as returned to callers, with course-qualified keys
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Full key of the block
    pub location: UsageKey,
    /// Named fields
    pub fields: Fields,
    /// Raw body
    pub data: Option<String>,
    /// Ordered children
    pub children: Vec<UsageKey>,
    /// True if the block has a draft revision
    pub is_draft: bool,
    /// Revision attribution
    pub edit_info: EditInfo,
}

impl Item {
    fn from_block(course: &CourseKey, block: &Block, is_draft: bool) -> Self {
        Self {
            location: course.usage_key(&block.key),
            fields: block.fields.clone(),
            data: block.data.clone(),
            children: block.children.iter().map(|c| course.usage_key(c)).collect(),
            is_draft,
            edit_info: block.edit_info.clone(),
        }
    }

    /// Display name field, if set
    pub fn display_name(&self) -> Option<&str> {
        self.fields.get("display_name").and_then(Value::as_str)
    }

    /// Set a field, returning self for chaining
    pub fn set_field(&mut self, name: &str, value: Value) -> &mut Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

// ============================================================================
// ModuleStore
// ============================================================================

/// Branched course content store
///
/// `ModuleStore` is `Send + Sync`; share it with `Arc` across threads.
///
/// # Example
///
/// ```text
/// let store = ModuleStore::ephemeral();
/// let user = UserId::from(-3);
/// let course = store.create_course("org", "num", "run", &user)?;
/// let chapter = store.create_child(&user, &course.location, "chapter", Some("ch1"))?;
/// let vertical = store.create_child(&user, &chapter.location, "vertical", Some("v1"))?;
/// store.publish(&vertical.location, &user)?;
/// ```
#[derive(Debug)]
pub struct ModuleStore {
    courses: CourseTable,
    config: StoreConfig,
    policy: BackendPolicy,
    categories: Categories,
    settings_schema: SettingsSchema,
    bulk: DashMap<CourseKey, BulkState>,
    metrics: StoreMetrics,
}

impl ModuleStore {
    /// Create a store from a config
    ///
    /// # Errors
    ///
    /// Returns an error if the config names an unknown backend.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let policy = config.policy()?;
        let categories = config.categories();
        Ok(Self {
            courses: CourseTable::new(),
            config,
            policy,
            categories,
            settings_schema: SettingsSchema::default(),
            bulk: DashMap::new(),
            metrics: StoreMetrics::new(),
        })
    }

    /// Store with default config (direct backend)
    pub fn ephemeral() -> Self {
        Self::with_policy(BackendPolicy::direct())
    }

    /// Store with default categories and an explicit policy
    pub fn with_policy(policy: BackendPolicy) -> Self {
        let config = StoreConfig::default();
        let categories = config.categories();
        Self {
            courses: CourseTable::new(),
            config,
            policy,
            categories,
            settings_schema: SettingsSchema::default(),
            bulk: DashMap::new(),
            metrics: StoreMetrics::new(),
        }
    }

    /// Open a store configured by `dir/coursestore.toml`
    ///
    /// Creates the directory and a default config file on first open.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let config = StoreConfig::from_file(&config_path)?;
        info!(path = %dir.display(), backend = %config.backend, "Opened course store");
        Self::new(config)
    }

    /// Replace the advanced-settings schema
    pub fn with_settings_schema(mut self, schema: SettingsSchema) -> Self {
        self.settings_schema = schema;
        self
    }

    /// Active config
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Active backend policy
    pub fn policy(&self) -> BackendPolicy {
        self.policy
    }

    /// Block-type categories
    pub fn categories(&self) -> &Categories {
        &self.categories
    }

    /// Advanced-settings schema
    pub fn settings_schema(&self) -> &SettingsSchema {
        &self.settings_schema
    }

    /// Counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub(crate) fn metrics_handle(&self) -> &StoreMetrics {
        &self.metrics
    }

    // ========================================================================
    // Locking helpers
    // ========================================================================

    fn handle(&self, course_key: &CourseKey) -> Result<CourseHandle> {
        self.courses.require(course_key)
    }

    /// Run `f` under the course read lock
    pub(crate) fn read<T>(
        &self,
        course_key: &CourseKey,
        f: impl FnOnce(&CourseState) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(course_key)?;
        let state = handle.read();
        f(&state)
    }

    /// Run `f` under the course write lock
    ///
    /// `f` must validate before its first change: on error nothing is
    /// recorded and derived metadata is left alone.
    pub(crate) fn write<T>(
        &self,
        course_key: &CourseKey,
        f: impl FnOnce(&mut CourseState) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(course_key)?;
        let mut state = handle.write();
        let out = f(&mut state)?;
        state.bump_version();
        self.metrics.record_write();
        self.after_write(course_key, &mut state);
        Ok(out)
    }

    // ========================================================================
    // Courses
    // ========================================================================

    /// All course keys, sorted
    pub fn list_courses(&self) -> Vec<CourseKey> {
        self.courses.keys()
    }

    /// True if the course exists
    pub fn has_course(&self, course_key: &CourseKey) -> bool {
        self.courses.contains(course_key)
    }

    /// Root item of a course
    pub fn get_course(&self, course_key: &CourseKey) -> Result<Item> {
        self.read(course_key, |state| {
            let root = state.root().clone();
            Self::item(state, &root, RevisionOption::DraftPreferred)
        })
    }

    /// Resolve an empty run by matching org and course number
    ///
    /// Keys parsed from the deprecated usage form carry no run. If exactly
    /// one stored course matches, its key is returned; otherwise the input
    /// is returned unchanged.
    pub fn fill_in_run(&self, course_key: &CourseKey) -> CourseKey {
        if !course_key.has_empty_run() {
            return course_key.clone();
        }
        let runs = self.courses.find_runs(&course_key.org, &course_key.course);
        match runs.as_slice() {
            [only] => course_key.with_run(&only.run),
            _ => course_key.clone(),
        }
    }

    // ========================================================================
    // Item reads
    // ========================================================================

    pub(crate) fn item(state: &CourseState, key: &BlockKey, revision: RevisionOption) -> Result<Item> {
        let block = state
            .get(key, revision)
            .ok_or_else(|| Error::not_found(state.course_key().usage_key(key)))?;
        let is_draft = match revision {
            RevisionOption::PublishedOnly => false,
            _ => state.has_draft(key),
        };
        Ok(Item::from_block(state.course_key(), block, is_draft))
    }

    /// Read a block through the draft view
    pub fn get_item(&self, key: &UsageKey) -> Result<Item> {
        self.get_item_with(key, RevisionOption::DraftPreferred)
    }

    /// Read a block with an explicit revision option
    pub fn get_item_with(&self, key: &UsageKey, revision: RevisionOption) -> Result<Item> {
        self.read(&key.course, |state| Self::item(state, &key.block, revision))
    }

    /// True if the block exists in the draft view
    pub fn has_item(&self, key: &UsageKey) -> bool {
        self.has_item_with(key, RevisionOption::DraftPreferred)
    }

    /// True if the block exists for the revision option
    pub fn has_item_with(&self, key: &UsageKey, revision: RevisionOption) -> bool {
        self.read(&key.course, |state| Ok(state.get(&key.block, revision).is_some()))
            .unwrap_or(false)
    }

    /// Every block visible for the revision option, optionally of one type
    pub fn get_items(
        &self,
        course_key: &CourseKey,
        revision: RevisionOption,
        block_type: Option<&str>,
    ) -> Result<Vec<Item>> {
        self.read(course_key, |state| {
            let keys = match revision {
                RevisionOption::DraftOnly => state.draft_keys(),
                other => state.view_keys(other.branch()),
            };
            keys.iter()
                .filter(|k| block_type.map_or(true, |t| k.block_type == t))
                .map(|k| Self::item(state, k, revision))
                .collect()
        })
    }

    /// Parent of a block in the view the revision option reads through
    ///
    /// Returns `None` when the block is missing from that view or is not
    /// listed by any parent there.
    pub fn get_parent_location(
        &self,
        key: &UsageKey,
        revision: RevisionOption,
    ) -> Result<Option<UsageKey>> {
        self.read(&key.course, |state| {
            if state.get(&key.block, revision).is_none() {
                return Ok(None);
            }
            Ok(state
                .parent(&key.block, revision.branch())
                .map(|p| key.course.usage_key(p)))
        })
    }

    // ========================================================================
    // Derived reads
    // ========================================================================

    /// True if the block or a draft-view descendant has unpublished changes
    pub fn has_changes(&self, key: &UsageKey) -> Result<bool> {
        self.read(&key.course, |state| {
            if state.draft_view(&key.block).is_none() {
                return Err(Error::not_found(key));
            }
            if !state.derived.is_dirty() {
                if let Some(cached) = state.derived.has_changes.get(&key.block) {
                    return Ok(*cached);
                }
            }
            Ok(bulk::changes_for(state, &self.categories, &key.block))
        })
    }

    /// Publication status of a block
    pub fn compute_publish_state(&self, key: &UsageKey) -> Result<PublishState> {
        let changes = self.has_changes(key)?;
        self.read(&key.course, |state| {
            Ok(if !state.is_published(&key.block) {
                PublishState::Private
            } else if changes {
                PublishState::Draft
            } else {
                PublishState::Public
            })
        })
    }

    /// Inheritable fields resolved from the block's draft-view ancestors
    pub fn inherited_fields(&self, key: &UsageKey) -> Result<Fields> {
        self.read(&key.course, |state| {
            if state.draft_view(&key.block).is_none() {
                return Err(Error::not_found(key));
            }
            if !state.derived.is_dirty() {
                if let Some(cached) = state.derived.inherited.get(&key.block) {
                    return Ok(cached.clone());
                }
            }
            Ok(bulk::inherited_for(state, &key.block))
        })
    }

    /// Blocks present in a view but unreachable from the course root
    ///
    /// The root and detached block types are never orphans.
    pub fn get_orphans(&self, course_key: &CourseKey, branch: Branch) -> Result<Vec<UsageKey>> {
        self.read(course_key, |state| {
            let reachable = state.reachable(branch);
            Ok(state
                .view_keys(branch)
                .into_iter()
                .filter(|k| !reachable.contains(k))
                .filter(|k| !self.categories.is_detached(&k.block_type))
                .map(|k| course_key.usage_key(&k))
                .collect())
        })
    }

    /// Number of (draft, published) revisions stored for a course
    pub fn revision_counts(&self, course_key: &CourseKey) -> Result<(usize, usize)> {
        self.read(course_key, |state| {
            Ok((
                state.draft_keys().len(),
                state.view_keys(Branch::Published).len(),
            ))
        })
    }
}
