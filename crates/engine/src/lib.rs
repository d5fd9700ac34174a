//! Course content engine
//!
//! This crate runs the draft/publish state machine over the courses held by
//! the storage layer:
//! - ModuleStore: create/update/move/delete, publish/unpublish/revert
//! - Backend policy: the switches where the two historical backends differ
//! - Bulk-operation scopes that coalesce derived-metadata recomputation
//! - OLX export of both branches for inspection
//! - Advanced-settings validation on the course root
//!
//! The engine is the only component that knows about block categories and
//! the draft view's write routing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod metrics;
pub mod modulestore;
pub mod olx;
pub mod policy;
pub mod settings;

pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use modulestore::{
    BulkOperation, CreateOptions, Item, ModuleStore, StoreConfig, CONFIG_FILE_NAME,
    INHERITABLE_FIELDS, ROOT_BLOCK_ID,
};
pub use olx::{export_course_to_olx, ExportInfo};
pub use policy::{AutoPublishedUnpublish, BackendPolicy, Categories, ParentCheck};
pub use settings::{SettingType, SettingsSchema};
