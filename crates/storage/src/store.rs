//! CourseTable: all courses, sharded by CourseKey
//!
//! - DashMap: sharded map from CourseKey to the course's state
//! - Per-course `parking_lot::RwLock`: readers of one course never block
//!   writers of another, and every mutation of a course holds its write
//!   lock for the whole operation
//!
//! The engine clones the `Arc` out of the map before locking, so no DashMap
//! shard guard is held while a course lock is taken.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use coursestore_core::{CourseKey, Error, Result};

use crate::course::CourseState;

/// Shared handle to one course
pub type CourseHandle = Arc<RwLock<CourseState>>;

/// All courses of a store
#[derive(Debug, Default)]
pub struct CourseTable {
    courses: DashMap<CourseKey, CourseHandle>,
}

impl CourseTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            courses: DashMap::new(),
        }
    }

    /// Add a course; fails if the key is taken
    pub fn insert(&self, state: CourseState) -> Result<CourseHandle> {
        let key = state.course_key().clone();
        match self.courses.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                Err(Error::DuplicateItem(e.key().to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let handle = Arc::new(RwLock::new(state));
                e.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Handle of a course
    pub fn get(&self, key: &CourseKey) -> Option<CourseHandle> {
        self.courses.get(key).map(|entry| entry.value().clone())
    }

    /// Handle of a course, or Not-Found
    pub fn require(&self, key: &CourseKey) -> Result<CourseHandle> {
        self.get(key).ok_or_else(|| Error::not_found(key))
    }

    /// Check presence
    pub fn contains(&self, key: &CourseKey) -> bool {
        self.courses.contains_key(key)
    }

    /// All course keys, sorted
    pub fn keys(&self) -> Vec<CourseKey> {
        let mut keys: Vec<CourseKey> = self.courses.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Courses matching org and course number, any run, sorted
    pub fn find_runs(&self, org: &str, course: &str) -> Vec<CourseKey> {
        let mut keys: Vec<CourseKey> = self
            .courses
            .iter()
            .filter(|e| e.key().org == org && e.key().course == course)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of courses
    pub fn len(&self) -> usize {
        self.courses.len()
    }

    /// Check if there are no courses
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}
