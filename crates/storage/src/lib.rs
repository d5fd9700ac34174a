//! Storage layer for the course store
//!
//! This crate implements the in-memory branch storage:
//! - BlockTable: one branch layer, BTreeMap of blocks plus a child → parent index
//! - CourseState: published layer, draft overlay, pending-deletion tombstones,
//!   and derived draft-view metadata for one course
//! - CourseTable: DashMap of courses, each behind a `parking_lot::RwLock`
//!
//! Policy (which block types auto-publish, what publish checks) lives in the
//! engine; this crate only keeps the layers and their indices consistent.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod course;
pub mod index;
pub mod store;
pub mod table;

pub use course::{CourseState, DerivedMetadata};
pub use index::ParentIndex;
pub use store::{CourseHandle, CourseTable};
pub use table::BlockTable;
