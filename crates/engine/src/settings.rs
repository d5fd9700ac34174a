//! Course advanced settings
//!
//! Advanced settings are fields of the course root block. Validated updates
//! are all-or-nothing: if any value fails its type check, nothing is stored
//! and the error carries one [`FieldError`] per offending field. The stored
//! settings are never partially updated, so the last good values remain
//! readable after a rejected update.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use coursestore_core::{CourseKey, Error, FieldError, Fields, Result, UserId};

use crate::modulestore::mutations::Editor;
use crate::modulestore::ModuleStore;

/// Expected type of a setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    /// JSON string
    String,
    /// JSON array
    List,
    /// JSON object
    Dict,
    /// Whole number
    Integer,
    /// Any number
    Float,
    /// true or false
    Boolean,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date
    Date,
}

impl SettingType {
    fn name(&self) -> &'static str {
        match self {
            SettingType::String => "a string",
            SettingType::List => "a list",
            SettingType::Dict => "a dictionary",
            SettingType::Integer => "an integer",
            SettingType::Float => "a number",
            SettingType::Boolean => "a boolean",
            SettingType::Date => "a date",
        }
    }

    /// Check a value; `null` clears a setting and is always accepted
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        let ok = match (self, value) {
            (_, Value::Null) => true,
            (SettingType::String, Value::String(_)) => true,
            (SettingType::List, Value::Array(_)) => true,
            (SettingType::Dict, Value::Object(_)) => true,
            (SettingType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (SettingType::Float, Value::Number(_)) => true,
            (SettingType::Boolean, Value::Bool(_)) => true,
            (SettingType::Date, Value::String(s)) => is_date(s),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("Incorrect value {}: expected {}", value, self.name()))
        }
    }
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Setting name → expected type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSchema {
    types: BTreeMap<String, SettingType>,
}

impl Default for SettingsSchema {
    fn default() -> Self {
        let types = [
            ("display_name", SettingType::String),
            ("advanced_modules", SettingType::List),
            ("discussion_topics", SettingType::Dict),
            ("max_attempts", SettingType::Integer),
            ("announcement", SettingType::Date),
            ("start", SettingType::Date),
            ("end", SettingType::Date),
            ("days_early_for_beta", SettingType::Float),
            ("show_calculator", SettingType::Boolean),
            ("showanswer", SettingType::String),
            ("graded", SettingType::Boolean),
        ];
        Self {
            types: types
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty))
                .collect(),
        }
    }
}

impl SettingsSchema {
    /// Schema with no known settings
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Add or replace a setting type
    pub fn with(mut self, name: &str, ty: SettingType) -> Self {
        self.types.insert(name.to_string(), ty);
        self
    }

    /// Type of a setting, if known
    pub fn get(&self, name: &str) -> Option<SettingType> {
        self.types.get(name).copied()
    }

    /// Check every change; one error per offending field, in name order
    ///
    /// Settings without a declared type are accepted as-is.
    pub fn validate(&self, changes: &Fields) -> Vec<FieldError> {
        changes
            .iter()
            .filter_map(|(name, value)| {
                let ty = self.get(name)?;
                ty.check(value).err().map(|msg| FieldError::new(name, msg))
            })
            .collect()
    }
}

impl ModuleStore {
    /// Advanced settings currently stored on the course root
    pub fn course_settings(&self, course_key: &CourseKey) -> Result<Fields> {
        Ok(self.get_course(course_key)?.fields)
    }

    /// Type-check and store settings changes
    ///
    /// # Errors
    ///
    /// `Validation` with one entry per bad field; nothing is stored.
    pub fn validate_and_update_settings(
        &self,
        course_key: &CourseKey,
        changes: Fields,
        user: &UserId,
    ) -> Result<Fields> {
        let errors = self.settings_schema().validate(&changes);
        if !errors.is_empty() {
            warn!(course = %course_key, rejected = errors.len(), "Settings update rejected");
            return Err(Error::Validation(errors));
        }
        self.store_settings(course_key, changes, user)
    }

    /// Store settings changes without type checks
    pub fn force_update_settings(
        &self,
        course_key: &CourseKey,
        changes: Fields,
        user: &UserId,
    ) -> Result<Fields> {
        self.store_settings(course_key, changes, user)
    }

    fn store_settings(&self, course_key: &CourseKey, changes: Fields, user: &UserId) -> Result<Fields> {
        let count = changes.len();
        let fields = self.write(course_key, |state| {
            let root = state.root().clone();
            let mut editor = Editor::new(state, self.categories(), user);
            let mut block = editor.view_block(&root)?;
            for (name, value) in changes {
                if value.is_null() {
                    block.fields.remove(&name);
                } else {
                    block.fields.insert(name, value);
                }
            }
            let fields = block.fields.clone();
            editor.write_view(block);
            Ok(fields)
        })?;
        debug!(course = %course_key, user = %user, count, "Stored course settings");
        Ok(fields)
    }
}
