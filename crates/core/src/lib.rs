//! Core types for the course store
//!
//! This crate defines the foundational types used throughout the system:
//! - CourseKey / UsageKey / BlockKey: identity scheme with current and deprecated forms
//! - UserId: attribution for mutations
//! - Block: a node of the course tree with fields, data and ordered children
//! - Branch / RevisionOption / PublishState: branch selectors and status
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod branch;
pub mod error;
pub mod keys;

pub use block::{Block, EditInfo, Fields};
pub use branch::{Branch, PublishState, RevisionOption};
pub use error::{Error, FieldError, Result};
pub use keys::{BlockKey, CourseKey, UsageKey, UserId};
