//! Course and block identity keys
//!
//! This module defines the identity scheme for stored content:
//! - CourseKey: (org, course, run)
//! - UsageKey: a block within a course, (course key, block type, block id)
//! - BlockKey: the course-relative part of a UsageKey, used inside storage
//! - UserId: opaque id attached to every mutation
//!
//! ## Serialization Forms
//!
//! Keys have two string forms, and both parse to the same structured value:
//!
//! | key | current | deprecated |
//! |-----|---------|------------|
//! | course | `course-v1:org+course+run` | `org/course/run` |
//! | usage | `block-v1:org+course+run+type@T+block@ID` | `i4x://org/course/T/ID` |
//!
//! The deprecated usage form carries no run; parsing it yields a course key
//! with an empty run.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const COURSE_PREFIX: &str = "course-v1:";
const BLOCK_PREFIX: &str = "block-v1:";
const DEPRECATED_BLOCK_PREFIX: &str = "i4x://";

/// Check a single key component.
///
/// Components are non-empty and limited to ASCII alphanumerics and `_-.~`,
/// which keeps both serialization forms unambiguous.
fn validate_component(input: &str, what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_key(input, format!("empty {}", what)));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~')))
    {
        return Err(Error::invalid_key(
            input,
            format!("invalid character '{}' in {}", c, what),
        ));
    }
    Ok(())
}

// =============================================================================
// CourseKey
// =============================================================================

/// Identity of a course: (org, course, run)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseKey {
    /// Owning organization
    pub org: String,
    /// Course number
    pub course: String,
    /// Course run; empty only for keys parsed from deprecated usage strings
    pub run: String,
}

impl CourseKey {
    /// Create and validate a course key
    pub fn new(org: &str, course: &str, run: &str) -> Result<Self> {
        let display = format!("{}+{}+{}", org, course, run);
        validate_component(&display, "org", org)?;
        validate_component(&display, "course", course)?;
        validate_component(&display, "run", run)?;
        Ok(Self {
            org: org.to_string(),
            course: course.to_string(),
            run: run.to_string(),
        })
    }

    /// True when the run is unknown (deprecated usage key origin)
    pub fn has_empty_run(&self) -> bool {
        self.run.is_empty()
    }

    /// Same course with the run replaced
    pub fn with_run(&self, run: &str) -> Self {
        Self {
            org: self.org.clone(),
            course: self.course.clone(),
            run: run.to_string(),
        }
    }

    /// Build the usage key of a block in this course
    pub fn make_usage_key(&self, block_type: &str, block_id: &str) -> UsageKey {
        UsageKey {
            course: self.clone(),
            block: BlockKey::new(block_type, block_id),
        }
    }

    /// Usage key for a course-relative block key
    pub fn usage_key(&self, block: &BlockKey) -> UsageKey {
        UsageKey {
            course: self.clone(),
            block: block.clone(),
        }
    }

    /// Deprecated `org/course/run` form
    pub fn to_deprecated_string(&self) -> String {
        format!("{}/{}/{}", self.org, self.course, self.run)
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}+{}+{}", COURSE_PREFIX, self.org, self.course, self.run)
    }
}

impl FromStr for CourseKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = if let Some(rest) = s.strip_prefix(COURSE_PREFIX) {
            rest.split('+').collect()
        } else {
            s.split('/').collect()
        };
        match parts.as_slice() {
            [org, course, run] => {
                validate_component(s, "org", org)?;
                validate_component(s, "course", course)?;
                validate_component(s, "run", run)?;
                Ok(Self {
                    org: org.to_string(),
                    course: course.to_string(),
                    run: run.to_string(),
                })
            }
            _ => Err(Error::invalid_key(s, "expected org, course and run")),
        }
    }
}

// =============================================================================
// BlockKey
// =============================================================================

/// Course-relative identity of a block: (block type, block id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey {
    /// Block type ("chapter", "vertical", "html", ...)
    pub block_type: String,
    /// Block id, unique within the course
    pub block_id: String,
}

impl BlockKey {
    /// Create a block key (unvalidated; see [`BlockKey::validated`])
    pub fn new(block_type: &str, block_id: &str) -> Self {
        Self {
            block_type: block_type.to_string(),
            block_id: block_id.to_string(),
        }
    }

    /// Create a block key, rejecting invalid components
    pub fn validated(block_type: &str, block_id: &str) -> Result<Self> {
        let display = format!("{}@{}", block_type, block_id);
        validate_component(&display, "block type", block_type)?;
        validate_component(&display, "block id", block_id)?;
        Ok(Self::new(block_type, block_id))
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.block_type, self.block_id)
    }
}

// =============================================================================
// UsageKey
// =============================================================================

/// Identity of a block within a course
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageKey {
    /// Owning course
    pub course: CourseKey,
    /// Course-relative block identity
    pub block: BlockKey,
}

impl UsageKey {
    /// Block type
    pub fn block_type(&self) -> &str {
        &self.block.block_type
    }

    /// Block id
    pub fn block_id(&self) -> &str {
        &self.block.block_id
    }

    /// Deprecated `i4x://org/course/type/id` form
    pub fn to_deprecated_string(&self) -> String {
        format!(
            "{}{}/{}/{}/{}",
            DEPRECATED_BLOCK_PREFIX,
            self.course.org,
            self.course.course,
            self.block.block_type,
            self.block.block_id
        )
    }

    /// True if `serialized` is either form of this key.
    ///
    /// The deprecated form has no run, so it matches on org, course,
    /// block type and block id.
    pub fn matches_serialized(&self, serialized: &str) -> bool {
        match serialized.parse::<UsageKey>() {
            Ok(other) if other.course.has_empty_run() => {
                other.course.org == self.course.org
                    && other.course.course == self.course.course
                    && other.block == self.block
            }
            Ok(other) => other == *self,
            Err(_) => false,
        }
    }

    /// Same block with the course key replaced
    pub fn with_course(&self, course: CourseKey) -> Self {
        Self {
            course,
            block: self.block.clone(),
        }
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}+{}+{}+type@{}+block@{}",
            BLOCK_PREFIX,
            self.course.org,
            self.course.course,
            self.course.run,
            self.block.block_type,
            self.block.block_id
        )
    }
}

impl FromStr for UsageKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix(BLOCK_PREFIX) {
            let parts: Vec<&str> = rest.split('+').collect();
            let [org, course, run, block_type, block_id] = parts.as_slice() else {
                return Err(Error::invalid_key(
                    s,
                    "expected org+course+run+type@..+block@..",
                ));
            };
            let block_type = block_type
                .strip_prefix("type@")
                .ok_or_else(|| Error::invalid_key(s, "missing type@"))?;
            let block_id = block_id
                .strip_prefix("block@")
                .ok_or_else(|| Error::invalid_key(s, "missing block@"))?;
            return Ok(Self {
                course: CourseKey::new(org, course, run)?,
                block: BlockKey::validated(block_type, block_id)?,
            });
        }

        if let Some(rest) = s.strip_prefix(DEPRECATED_BLOCK_PREFIX) {
            let parts: Vec<&str> = rest.split('/').collect();
            let [org, course, block_type, block_id] = parts.as_slice() else {
                return Err(Error::invalid_key(s, "expected org/course/type/id"));
            };
            validate_component(s, "org", org)?;
            validate_component(s, "course", course)?;
            return Ok(Self {
                course: CourseKey {
                    org: org.to_string(),
                    course: course.to_string(),
                    run: String::new(),
                },
                block: BlockKey::validated(block_type, block_id)?,
            });
        }

        Err(Error::invalid_key(s, "unknown usage key form"))
    }
}

// =============================================================================
// UserId
// =============================================================================

/// Opaque identity of the user performing a mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a user id from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn course() -> CourseKey {
        CourseKey::new("test_org", "test_course", "test_run").unwrap()
    }

    #[test]
    fn test_course_key_forms() {
        let key = course();
        assert_eq!(key.to_string(), "course-v1:test_org+test_course+test_run");
        assert_eq!(key.to_deprecated_string(), "test_org/test_course/test_run");

        let from_new: CourseKey = "course-v1:test_org+test_course+test_run".parse().unwrap();
        let from_old: CourseKey = "test_org/test_course/test_run".parse().unwrap();
        assert_eq!(from_new, key);
        assert_eq!(from_old, key);
    }

    #[test]
    fn test_course_key_rejects_bad_components() {
        assert!(CourseKey::new("org", "", "run").is_err());
        assert!(CourseKey::new("o+g", "c", "r").is_err());
        assert!("course-v1:a+b".parse::<CourseKey>().is_err());
        assert!("a/b/c/d".parse::<CourseKey>().is_err());
    }

    #[test]
    fn test_usage_key_current_form() {
        let key = course().make_usage_key("vertical", "vertical03");
        let s = key.to_string();
        assert_eq!(
            s,
            "block-v1:test_org+test_course+test_run+type@vertical+block@vertical03"
        );
        assert_eq!(s.parse::<UsageKey>().unwrap(), key);
    }

    #[test]
    fn test_usage_key_deprecated_form() {
        let key = course().make_usage_key("html", "unit00");
        let s = key.to_deprecated_string();
        assert_eq!(s, "i4x://test_org/test_course/html/unit00");

        let parsed: UsageKey = s.parse().unwrap();
        assert!(parsed.course.has_empty_run());
        assert_eq!(parsed.block, key.block);
        assert_eq!(parsed.with_course(course()), key);
    }

    #[test]
    fn test_matches_serialized_accepts_both_forms() {
        let key = course().make_usage_key("chapter", "chapter00");
        assert!(key.matches_serialized(&key.to_string()));
        assert!(key.matches_serialized(&key.to_deprecated_string()));
        assert!(!key.matches_serialized("i4x://test_org/test_course/chapter/chapter01"));
        assert!(!key.matches_serialized("garbage"));
    }

    #[test]
    fn test_usage_key_parse_errors() {
        assert!("block-v1:a+b+c+html+block@x".parse::<UsageKey>().is_err());
        assert!("block-v1:a+b+c+type@html+x".parse::<UsageKey>().is_err());
        assert!("i4x://a/b/html".parse::<UsageKey>().is_err());
        assert!("http://nope".parse::<UsageKey>().is_err());
    }

    #[test]
    fn test_user_id_conversions() {
        assert_eq!(UserId::from(-3).as_str(), "-3");
        assert_eq!(UserId::from("staff").to_string(), "staff");
    }

    proptest! {
        #[test]
        fn prop_usage_key_both_forms_parse_to_same_block(
            org in "[a-z][a-z0-9_]{0,8}",
            num in "[A-Z0-9][A-Za-z0-9.]{0,6}",
            run in "[0-9]{4}_T[1-3]",
            block_type in "[a-z]{2,10}",
            block_id in "[a-z0-9]{1,12}",
        ) {
            let ck = CourseKey::new(&org, &num, &run).unwrap();
            let key = ck.make_usage_key(&block_type, &block_id);
            let current: UsageKey = key.to_string().parse().unwrap();
            let deprecated: UsageKey = key.to_deprecated_string().parse().unwrap();
            prop_assert_eq!(&current, &key);
            prop_assert_eq!(deprecated.with_course(ck), key);
        }
    }
}
