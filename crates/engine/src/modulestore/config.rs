//! Store configuration via `coursestore.toml`
//!
//! On first open of a directory, a default `coursestore.toml` is created.
//! To change settings, edit the file and reopen the store.

use serde::{Deserialize, Serialize};
use std::path::Path;

use coursestore_core::{Error, Result};

use crate::policy::{AutoPublishedUnpublish, BackendPolicy, Categories};

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "coursestore.toml";

/// Block types that are auto-published by default.
pub const DEFAULT_DIRECT_ONLY: [&str; 6] = [
    "course",
    "chapter",
    "sequential",
    "about",
    "static_tab",
    "course_info",
];

/// Block types that live outside the course tree by default.
pub const DEFAULT_DETACHED: [&str; 3] = ["about", "static_tab", "course_info"];

fn default_backend_str() -> String {
    "direct".to_string()
}

fn default_direct_only() -> Vec<String> {
    DEFAULT_DIRECT_ONLY.iter().map(|s| s.to_string()).collect()
}

fn default_detached() -> Vec<String> {
    DEFAULT_DETACHED.iter().map(|s| s.to_string()).collect()
}

/// Store configuration loaded from `coursestore.toml`.
///
/// # Example
///
/// ```toml
/// backend = "versioned"
/// unpublish_direct_only = "delete"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Backend semantics: `"direct"` or `"versioned"`.
    #[serde(default = "default_backend_str")]
    pub backend: String,
    /// Override for unpublishing auto-published blocks: `"delete"` or `"reject"`.
    /// Defaults to what the backend does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpublish_direct_only: Option<AutoPublishedUnpublish>,
    /// Block types written straight to the published branch.
    #[serde(default = "default_direct_only")]
    pub direct_only_categories: Vec<String>,
    /// Block types that are never attached to a parent.
    #[serde(default = "default_detached")]
    pub detached_categories: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_str(),
            unpublish_direct_only: None,
            direct_only_categories: default_direct_only(),
            detached_categories: default_detached(),
        }
    }
}

impl StoreConfig {
    /// Config for the versioned backend, other settings default
    pub fn versioned() -> Self {
        Self {
            backend: "versioned".to_string(),
            ..Self::default()
        }
    }

    /// Resolve the backend policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `backend` is not `"direct"` or `"versioned"`.
    pub fn policy(&self) -> Result<BackendPolicy> {
        let mut policy = match self.backend.as_str() {
            "direct" => BackendPolicy::direct(),
            "versioned" => BackendPolicy::versioned(),
            other => {
                return Err(Error::Config(format!(
                    "Invalid backend '{}' in {}. Expected \"direct\" or \"versioned\".",
                    other, CONFIG_FILE_NAME
                )))
            }
        };
        if let Some(unpublish) = self.unpublish_direct_only {
            policy.auto_published_unpublish = unpublish;
        }
        Ok(policy)
    }

    /// Block-type categories
    pub fn categories(&self) -> Categories {
        Categories::new(
            self.direct_only_categories.iter().cloned(),
            self.detached_categories.iter().cloned(),
        )
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Course store configuration
#
# Backend semantics: "direct" (default) or "versioned"
#   "direct"    = publishing a block whose parent is unpublished is allowed;
#                 unpublishing an auto-published block deletes it
#   "versioned" = ancestors must be published first;
#                 unpublishing an auto-published block is refused
backend = "direct"

# Override the unpublish behavior for auto-published blocks: "delete" or "reject"
# unpublish_direct_only = "delete"

# Block types written straight to the published branch
direct_only_categories = ["course", "chapter", "sequential", "about", "static_tab", "course_info"]

# Block types that live outside the course tree
detached_categories = ["about", "static_tab", "course_info"]
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        // Validate the backend value eagerly
        config.policy()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
