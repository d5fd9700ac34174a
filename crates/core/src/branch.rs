//! Branch and revision selectors

use serde::{Deserialize, Serialize};
use std::fmt;

/// A branch of a course's content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    /// Editable, work-in-progress view
    Draft,
    /// Publicly visible view
    Published,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Draft => f.write_str("draft"),
            Branch::Published => f.write_str("published"),
        }
    }
}

/// Which revision(s) a read consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RevisionOption {
    /// Draft revision if one exists, otherwise the published one
    #[default]
    DraftPreferred,
    /// Only a draft revision
    DraftOnly,
    /// Only the published revision
    PublishedOnly,
}

impl RevisionOption {
    /// The view this option reads through
    pub fn branch(&self) -> Branch {
        match self {
            RevisionOption::DraftPreferred | RevisionOption::DraftOnly => Branch::Draft,
            RevisionOption::PublishedOnly => Branch::Published,
        }
    }
}

impl From<Branch> for RevisionOption {
    fn from(branch: Branch) -> Self {
        match branch {
            Branch::Draft => RevisionOption::DraftPreferred,
            Branch::Published => RevisionOption::PublishedOnly,
        }
    }
}

/// Publication status of a block as seen by authors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishState {
    /// Never published; exists only as a draft
    Private,
    /// Published, with unpublished draft changes
    Draft,
    /// Published, no pending changes
    Public,
}
