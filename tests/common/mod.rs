//! Shared test utilities for the integration test suites.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

pub use coursestore::{
    export_course_to_olx, BackendPolicy, Branch, CourseKey, ExportInfo, ModuleStore,
    RevisionOption, UsageKey, UserId,
};
use regex::Regex;
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness's captured writer.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}

/// The acting user in every test.
pub fn user() -> UserId {
    UserId::from(-3)
}

// ============================================================================
// BinaryCourse - the four-level course used by the publish tests
// ============================================================================

/// Course with two chapters, four sequentials, eight verticals, and
/// sixteen html units. Ids are `{type}{nn}` (`chapter00`, `vertical05`)
/// and `unit{nn}` for the html blocks.
///
/// Chapters and sequentials are auto-published; verticals and units start
/// as drafts.
pub struct BinaryCourse {
    pub store: ModuleStore,
    pub course_key: CourseKey,
    /// (block_type, block_id) → parent (block_type, block_id)
    pub parents: BTreeMap<(String, String), (String, String)>,
}

fn block_id(prefix: &str, n: usize) -> String {
    format!("{}{:02}", prefix, n)
}

impl BinaryCourse {
    /// Build the course in a store with the given policy.
    pub fn build(policy: BackendPolicy) -> Self {
        init_tracing();
        let store = ModuleStore::with_policy(policy);
        let course = store
            .create_course("test_org", "test_course", "test_run", &user())
            .unwrap();
        let course_key = course.location.course.clone();
        let mut parents = BTreeMap::new();

        let levels = [
            ("course", "course", "chapter", "chapter", 2),
            ("chapter", "chapter", "sequential", "sequential", 4),
            ("sequential", "sequential", "vertical", "vertical", 8),
            ("vertical", "vertical", "html", "unit", 16),
        ];
        for (parent_type, parent_prefix, child_type, child_prefix, count) in levels {
            for idx in 0..count {
                let parent_id = if parent_type == "course" {
                    "course".to_string()
                } else {
                    block_id(parent_prefix, idx / 2)
                };
                let parent = course_key.make_usage_key(parent_type, &parent_id);
                let child_id = block_id(child_prefix, idx);
                store
                    .create_child(&user(), &parent, child_type, Some(&child_id))
                    .unwrap();
                parents.insert(
                    (child_type.to_string(), child_id),
                    (parent_type.to_string(), parent_id),
                );
            }
        }
        Self {
            store,
            course_key,
            parents,
        }
    }

    /// Usage key of a block.
    pub fn key(&self, block_type: &str, block_id: &str) -> UsageKey {
        self.course_key.make_usage_key(block_type, block_id)
    }

    /// Publish a block by type and id.
    pub fn publish(&self, block_type: &str, block_id: &str) -> coursestore::Result<()> {
        self.store
            .publish(&self.key(block_type, block_id), &user())
            .map(|_| ())
    }

    /// Unpublish a block by type and id.
    pub fn unpublish(&self, block_type: &str, block_id: &str) -> coursestore::Result<()> {
        self.store.unpublish(&self.key(block_type, block_id), &user())
    }

    /// Export into a fresh directory under `root`.
    pub fn export(&self, root: &Path, name: &str) -> OlxDir {
        let info = export_course_to_olx(&self.store, &self.course_key, root, name).unwrap();
        OlxDir {
            path: info.path.clone(),
            info,
            course_key: self.course_key.clone(),
        }
    }

    /// (parent_type, parent_id, index) of a block in the binary layout.
    pub fn position(&self, block_type: &str, block_id: &str) -> (String, String, usize) {
        let (parent_type, parent_id) = self
            .parents
            .get(&(block_type.to_string(), block_id.to_string()))
            .cloned()
            .unwrap();
        let n: usize = block_id
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .unwrap();
        (parent_type, parent_id, n % 2)
    }
}

// ============================================================================
// OlxDir - assertions over an exported course
// ============================================================================

/// An exported course directory.
pub struct OlxDir {
    pub path: PathBuf,
    pub info: ExportInfo,
    pub course_key: CourseKey,
}

impl OlxDir {
    fn file(&self, block_type: &str, block_id: &str, draft: bool) -> PathBuf {
        let mut path = self.path.clone();
        if draft {
            path.push("drafts");
        }
        path.push(block_type);
        path.push(format!("{}.xml", block_id));
        path
    }

    /// Contents of a block file; panics if missing.
    pub fn read(&self, block_type: &str, block_id: &str, draft: bool) -> String {
        let path = self.file(block_type, block_id, draft);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("{} is not readable: {}", path.display(), e))
    }

    /// True if the block file exists.
    pub fn exists(&self, block_type: &str, block_id: &str, draft: bool) -> bool {
        self.file(block_type, block_id, draft).is_file()
    }

    /// Assert the file exists and matches `pattern`.
    pub fn assert_matches(&self, block_type: &str, block_id: &str, draft: bool, pattern: &str) {
        let contents = self.read(block_type, block_id, draft);
        let re = Regex::new(pattern).unwrap();
        assert!(
            re.is_match(&contents),
            "Block ({}, {}) contents of:\n{}\ndon't match regex of:\n{}",
            block_type,
            block_id,
            contents,
            pattern
        );
    }

    /// Regex for the current and deprecated serializations of a parent key.
    pub fn parent_url_pattern(&self, parent_type: &str, parent_id: &str) -> String {
        let current = regex::escape(&self.course_key.make_usage_key(parent_type, parent_id).to_string());
        let deprecated = regex::escape(
            &self
                .course_key
                .make_usage_key(parent_type, parent_id)
                .to_deprecated_string(),
        );
        format!("({}|{})", deprecated, current)
    }
}

/// Temp root for exports; removed on drop.
pub fn export_root() -> TempDir {
    TempDir::new().unwrap()
}
