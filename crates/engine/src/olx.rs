//! OLX export
//!
//! Writes a course as an OLX directory: one XML file per block, with the
//! published branch at the top level and draft revisions under `drafts/`.
//! Used to inspect branch state on disk; export never changes the store.
//!
//! ## Layout
//!
//! ```text
//! {root_dir}/{course_dir}/
//!   course.xml
//!   {type}/{id}.xml            published revisions
//!   {type}/{id}.html           data body of a published pointer block
//!   drafts/{type}/{id}.xml     draft revisions attached in the draft view
//!   drafts/{type}/{id}.html
//! ```
//!
//! Child elements reference children by `url_name`. Children absent from
//! the exported view are left out, so a published sequential whose
//! verticals are all draft exports as `<sequential/>`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use coursestore_core::{Block, BlockKey, Branch, CourseKey, Result, RevisionOption};
use coursestore_storage::CourseState;

use crate::modulestore::ModuleStore;

/// Name of the drafts subdirectory.
pub const DRAFTS_DIR: &str = "drafts";

/// Information returned after exporting a course
#[derive(Debug, Clone)]
pub struct ExportInfo {
    /// Directory the course was written to
    pub path: PathBuf,
    /// Number of published block files
    pub published_blocks: usize,
    /// Number of draft block files
    pub draft_blocks: usize,
    /// Draft revisions skipped because no parent lists them
    pub skipped_drafts: usize,
}

/// One file to write, relative to the course directory
struct OlxFile {
    path: PathBuf,
    contents: String,
}

/// Where a draft file sits in its parent's child list
struct DraftPosition {
    parent_url: String,
    index: usize,
}

// =============================================================================
// XML rendering
// =============================================================================

/// Escape text for use inside a double-quoted attribute
pub fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            _ => out.push(c),
        }
    }
    out
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Attribute text of a field value
fn attr_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn render_block(
    block: &Block,
    draft: Option<&DraftPosition>,
    present: impl Fn(&BlockKey) -> bool,
) -> String {
    let mut attrs: Vec<(String, String)> = Vec::new();
    if let Some(pos) = draft {
        attrs.push(("parent_url".to_string(), pos.parent_url.clone()));
        attrs.push(("index_in_children_list".to_string(), pos.index.to_string()));
    }
    if block.data.is_some() {
        attrs.push(("filename".to_string(), block.key.block_id.clone()));
    }
    for (name, value) in &block.fields {
        if !is_xml_name(name) {
            warn!(block = %block.key, field = %name, "Field name is not a valid XML attribute, skipped");
            continue;
        }
        attrs.push((name.clone(), attr_value(value)));
    }

    let mut out = String::new();
    let _ = write!(out, "<{}", block.key.block_type);
    for (name, value) in &attrs {
        let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
    }
    let children: Vec<&BlockKey> = block.children.iter().filter(|c| present(*c)).collect();
    if children.is_empty() {
        out.push_str("/>\n");
        return out;
    }
    out.push_str(">\n");
    for child in children {
        let _ = writeln!(
            out,
            "  <{} url_name=\"{}\"/>",
            child.block_type,
            escape_attr(&child.block_id)
        );
    }
    let _ = writeln!(out, "</{}>", block.key.block_type);
    out
}

fn block_files(prefix: &Path, block: &Block, xml: String) -> Vec<OlxFile> {
    let dir = prefix.join(&block.key.block_type);
    let mut files = vec![OlxFile {
        path: dir.join(format!("{}.xml", block.key.block_id)),
        contents: xml,
    }];
    if let Some(data) = &block.data {
        files.push(OlxFile {
            path: dir.join(format!("{}.html", block.key.block_id)),
            contents: data.clone(),
        });
    }
    files
}

// =============================================================================
// Export
// =============================================================================

/// Render every file of a course under its read lock
fn collect(state: &CourseState) -> (Vec<OlxFile>, usize, usize, usize) {
    let course_key: &CourseKey = state.course_key();
    let mut files = vec![OlxFile {
        path: PathBuf::from("course.xml"),
        contents: format!(
            "<course url_name=\"{}\" org=\"{}\" course=\"{}\"/>\n",
            escape_attr(&state.root().block_id),
            escape_attr(&course_key.org),
            escape_attr(&course_key.course)
        ),
    }];

    let mut published = 0;
    for key in state.view_keys(Branch::Published) {
        let Some(block) = state.published(&key) else {
            continue;
        };
        let xml = render_block(block, None, |c| state.is_published(c));
        files.extend(block_files(Path::new(""), block, xml));
        published += 1;
    }

    let mut drafts = 0;
    let mut skipped = 0;
    let drafts_dir = Path::new(DRAFTS_DIR);
    for key in state.draft_keys() {
        let Some(block) = state.get(&key, RevisionOption::DraftOnly) else {
            continue;
        };
        let position = state.draft_parent(&key).and_then(|parent| {
            let index = state.draft_view(parent)?.child_index(&key)?;
            Some(DraftPosition {
                parent_url: course_key.usage_key(parent).to_string(),
                index,
            })
        });
        let Some(position) = position else {
            warn!(course = %course_key, block = %key, "Draft is not attached to a parent, skipped");
            skipped += 1;
            continue;
        };
        let xml = render_block(block, Some(&position), |c| state.draft_view(c).is_some());
        files.extend(block_files(drafts_dir, block, xml));
        drafts += 1;
    }
    (files, published, drafts, skipped)
}

/// Export a course to `root_dir/course_dir`
///
/// Existing files at the same paths are overwritten. Rendering happens
/// under the course read lock; files are written after it is released.
///
/// # Errors
///
/// Returns `ItemNotFound` if the course is missing, `Io` on write failure.
pub fn export_course_to_olx(
    store: &ModuleStore,
    course_key: &CourseKey,
    root_dir: &Path,
    course_dir: &str,
) -> Result<ExportInfo> {
    let (files, published_blocks, draft_blocks, skipped_drafts) =
        store.read(course_key, |state| Ok(collect(state)))?;

    let base = root_dir.join(course_dir);
    std::fs::create_dir_all(&base)?;
    for file in &files {
        let path = base.join(&file.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &file.contents)?;
    }

    store.metrics_handle().record_export();
    info!(
        course = %course_key,
        path = %base.display(),
        published_blocks,
        draft_blocks,
        skipped_drafts,
        "Exported course"
    );
    Ok(ExportInfo {
        path: base,
        published_blocks,
        draft_blocks,
        skipped_drafts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursestore_core::UserId;
    use serde_json::json;

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape_attr("plain"), "plain");
    }

    #[test]
    fn test_xml_name() {
        assert!(is_xml_name("display_name"));
        assert!(is_xml_name("x.y-z"));
        assert!(!is_xml_name("1abc"));
        assert!(!is_xml_name("has space"));
        assert!(!is_xml_name(""));
    }

    #[test]
    fn test_render_self_closes_without_present_children() {
        let user = UserId::from(1);
        let mut block = Block::new(BlockKey::new("sequential", "s"), &user);
        block.children.push(BlockKey::new("vertical", "v"));
        assert_eq!(render_block(&block, None, |_| false), "<sequential/>\n");
    }

    #[test]
    fn test_render_draft_attrs_first() {
        let user = UserId::from(1);
        let mut block = Block::new(BlockKey::new("vertical", "v"), &user);
        block.fields.insert("display_name".into(), json!("Unit \"1\""));
        block.fields.insert("graded".into(), json!(true));
        block.children.push(BlockKey::new("html", "h"));
        let pos = DraftPosition {
            parent_url: "block-v1:o+c+r+type@sequential+block@s".into(),
            index: 2,
        };
        let xml = render_block(&block, Some(&pos), |_| true);
        assert_eq!(
            xml,
            "<vertical parent_url=\"block-v1:o+c+r+type@sequential+block@s\" \
             index_in_children_list=\"2\" display_name=\"Unit &quot;1&quot;\" graded=\"true\">\n  \
             <html url_name=\"h\"/>\n</vertical>\n"
        );
    }

    #[test]
    fn test_render_pointer_block() {
        let user = UserId::from(1);
        let block =
            Block::new(BlockKey::new("html", "intro"), &user).with_data(Some("<p>hi</p>".into()));
        assert_eq!(
            render_block(&block, None, |_| true),
            "<html filename=\"intro\"/>\n"
        );
        let files = block_files(Path::new(DRAFTS_DIR), &block, String::new());
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].path, Path::new("drafts/html/intro.html"));
        assert_eq!(files[1].contents, "<p>hi</p>");
    }
}
