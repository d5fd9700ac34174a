//! Backend policy
//!
//! Two storage backends historically disagreed on two operations. Rather than
//! two state machines, the engine runs one and consults these switches at the
//! points where they differ.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What publish requires of the block's ancestors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentCheck {
    /// Publish even if ancestors are not published; the block becomes
    /// reachable once they are
    AllowUnpublishedParent,
    /// Every ancestor must already be on the published branch
    RequirePublishedAncestors,
}

/// What unpublish does to a block that is auto-published (never drafted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPublishedUnpublish {
    /// Remove it outright; its children lose their parent link
    Delete,
    /// Refuse with an Invalid-State error
    Reject,
}

/// Switches consulted where backends diverge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendPolicy {
    /// Publish precondition on ancestors
    pub parent_check: ParentCheck,
    /// Unpublish of auto-published blocks
    pub auto_published_unpublish: AutoPublishedUnpublish,
}

impl BackendPolicy {
    /// Direct-write backend: permissive publish, unpublish deletes
    pub const fn direct() -> Self {
        Self {
            parent_check: ParentCheck::AllowUnpublishedParent,
            auto_published_unpublish: AutoPublishedUnpublish::Delete,
        }
    }

    /// Versioned-history backend: ancestor-first publish, unpublish refuses
    pub const fn versioned() -> Self {
        Self {
            parent_check: ParentCheck::RequirePublishedAncestors,
            auto_published_unpublish: AutoPublishedUnpublish::Reject,
        }
    }
}

impl Default for BackendPolicy {
    fn default() -> Self {
        Self::direct()
    }
}

/// Block-type categories that change write routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categories {
    direct_only: BTreeSet<String>,
    detached: BTreeSet<String>,
}

impl Categories {
    /// Build from type lists
    pub fn new<I, J, S, T>(direct_only: I, detached: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            direct_only: direct_only.into_iter().map(Into::into).collect(),
            detached: detached.into_iter().map(Into::into).collect(),
        }
    }

    /// True if writes to this type go straight to the published branch
    pub fn is_direct_only(&self, block_type: &str) -> bool {
        self.direct_only.contains(block_type)
    }

    /// True if this type lives outside the tree and is never an orphan
    pub fn is_detached(&self, block_type: &str) -> bool {
        self.detached.contains(block_type)
    }
}
