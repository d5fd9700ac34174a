//! coursestore - branched course content store
//!
//! A course is a tree of blocks (course → chapter → sequential → vertical →
//! units). Each block can have a draft and a published revision; publishing
//! copies a draft subtree onto the published branch, and OLX export writes
//! both branches to disk for inspection.
//!
//! # Quick Start
//!
//! ```ignore
//! use coursestore::{ModuleStore, UserId};
//!
//! let store = ModuleStore::ephemeral();
//! let user = UserId::from(-3);
//! let course = store.create_course("org", "101", "2030", &user)?;
//! let chapter = store.create_child(&user, &course.location, "chapter", Some("intro"))?;
//! let seq = store.create_child(&user, &chapter.location, "sequential", Some("week1"))?;
//! let unit = store.create_child(&user, &seq.location, "vertical", Some("unit1"))?;
//!
//! assert!(store.has_changes(&unit.location)?);
//! store.publish(&unit.location, &user)?;
//! ```
//!
//! # Architecture
//!
//! - `coursestore-core`: keys, blocks, branch selectors, errors
//! - `coursestore-storage`: per-course layers and the child → parent index
//! - `coursestore-engine`: the ModuleStore state machine, policy, export
//!
//! Storage internals are not re-exported; everything else is.

pub use coursestore_core::{
    Block, BlockKey, Branch, CourseKey, EditInfo, Error, FieldError, Fields, PublishState, Result,
    RevisionOption, UsageKey, UserId,
};
pub use coursestore_engine::*;
