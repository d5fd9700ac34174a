//! Error types for the course store
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Error Classes
//!
//! - **Not-Found**: a block, course, or required ancestor is missing on the
//!   branch being read or written.
//! - **Invalid-State**: the tree or versioning rules forbid the operation.
//! - **Validation**: one or more setting values failed type checks; carries
//!   one [`FieldError`] per offending field.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for course store operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single rejected field in a validated update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Error types for the course store
#[derive(Debug, Error)]
pub enum Error {
    /// Requested item, course, or ancestor does not exist on the target branch
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Operation forbidden by the block's versioning or tree invariants
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An item with the same identity already exists
    #[error("Duplicate item: {0}")]
    DuplicateItem(String),

    /// A key could not be parsed or has an invalid component
    #[error("Invalid key '{input}': {reason}")]
    InvalidKey {
        /// The rejected input
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// One or more field values failed validation; nothing was persisted
    #[error("Validation failed for {} field(s): {}", .0.len(), join_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// Configuration file could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error (export, config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Not-Found error for anything with a display form
    pub fn not_found(what: impl fmt::Display) -> Self {
        Error::ItemNotFound(what.to_string())
    }

    /// Invalid-State error with a message
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Invalid key error
    pub fn invalid_key(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidKey {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// True for the Not-Found class
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ItemNotFound(_))
    }

    /// True for the Invalid-State class
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }

    /// Field errors carried by a validation failure (empty otherwise)
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::Validation(errors) => errors,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
