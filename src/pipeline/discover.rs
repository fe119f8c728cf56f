//! File discovery: scan a folder and fix the order every later stage uses.
//!
//! Ordering is by `(order_prefix, file_name)` ascending. The prefix is the
//! integer in a leading `<digits>-` run (`02-budget.md` → 2); files without
//! one get [`NO_PREFIX`], which sorts after every real prefix. Ties on the
//! prefix fall back to the file name, so the order is total and two scans of
//! an unchanged folder always agree.

use crate::error::BriefingError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sort key for files without a numeric prefix.
pub const NO_PREFIX: u64 = u64::MAX;

/// Extensions treated as Markdown (compared case-insensitively).
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

static RE_ORDER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)-").unwrap());

/// One input Markdown file, read for a single build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub order_prefix: u64,
    pub raw_text: String,
}

impl Document {
    /// File name without directory.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// `true` when the file name carried a `<digits>-` prefix.
    pub fn has_prefix(&self) -> bool {
        self.order_prefix != NO_PREFIX
    }
}

/// The documents for one build, in build order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSet {
    documents: Vec<Document>,
}

impl OrderedSet {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Paths in build order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.documents.iter().map(|d| d.path.clone()).collect()
    }

    /// File names in build order.
    pub fn names(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|d| d.file_name().to_string())
            .collect()
    }
}

impl<'a> IntoIterator for &'a OrderedSet {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

/// Parse the leading `<digits>-` prefix of a file name.
///
/// Returns [`NO_PREFIX`] when there is none. A digit run too long for `u64`
/// sorts just before unprefixed files.
pub fn order_prefix(file_name: &str) -> u64 {
    match RE_ORDER_PREFIX.captures(file_name) {
        Some(caps) => caps[1].parse().unwrap_or(NO_PREFIX - 1),
        None => NO_PREFIX,
    }
}

/// Whether `path` has a Markdown extension.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|m| e.eq_ignore_ascii_case(m))
        })
        .unwrap_or(false)
}

/// List the Markdown files in `folder` in build order, without reading them.
pub fn scan(folder: &Path) -> Result<Vec<PathBuf>, BriefingError> {
    if !folder.is_dir() {
        return Err(BriefingError::InvalidFolder {
            path: folder.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(folder).map_err(|_| BriefingError::InvalidFolder {
        path: folder.to_path_buf(),
    })?;

    let mut files: Vec<(u64, String, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_markdown(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            debug!("Skipping non-UTF-8 file name: {}", path.display());
            continue;
        };
        files.push((order_prefix(&name), name, path));
    }

    files.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    Ok(files.into_iter().map(|(_, _, p)| p).collect())
}

/// Discover and read every Markdown document in `folder`.
///
/// # Errors
/// * [`BriefingError::InvalidFolder`] — `folder` is missing or not a directory
/// * [`BriefingError::DocumentRead`] — a file could not be read as UTF-8
pub fn discover(folder: impl AsRef<Path>) -> Result<OrderedSet, BriefingError> {
    let folder = folder.as_ref();
    let paths = scan(folder)?;

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let raw_text = std::fs::read_to_string(&path).map_err(|e| BriefingError::DocumentRead {
            path: path.clone(),
            source: e,
        })?;
        let order_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(order_prefix)
            .unwrap_or(NO_PREFIX);
        documents.push(Document {
            path,
            order_prefix,
            raw_text,
        });
    }

    info!(
        "Discovered {} Markdown documents in {}",
        documents.len(),
        folder.display()
    );
    Ok(OrderedSet { documents })
}

/// Append an `[[image:<name>]]` placeholder on a new line at the end of `path`.
pub fn append_image_placeholder(path: &Path, name: &str) -> Result<(), BriefingError> {
    let name = name.trim();
    if name.is_empty() || name.contains("]]") || name.contains('\n') {
        return Err(BriefingError::InvalidConfig(format!(
            "invalid image placeholder name {name:?}"
        )));
    }

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| BriefingError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    write!(file, "\n[[image:{name}]]").map_err(|e| BriefingError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!("Appended [[image:{}]] to {}", name, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_order_prefix() {
        assert_eq!(order_prefix("02-b.md"), 2);
        assert_eq!(order_prefix("1-a.md"), 1);
        assert_eq!(order_prefix("000-x.md"), 0);
        assert_eq!(order_prefix("noprefix.md"), NO_PREFIX);
        assert_eq!(order_prefix("12.md"), NO_PREFIX);
        assert_eq!(order_prefix("a-12-b.md"), NO_PREFIX);
        assert_eq!(order_prefix("99999999999999999999999-x.md"), NO_PREFIX - 1);
    }

    #[test]
    fn numeric_not_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "02-b.md", "b");
        touch(dir.path(), "1-a.md", "a");
        touch(dir.path(), "noprefix.md", "n");
        touch(dir.path(), "10-c.md", "c");

        let set = discover(dir.path()).unwrap();
        assert_eq!(set.names(), vec!["1-a.md", "02-b.md", "10-c.md", "noprefix.md"]);
        assert_eq!(set.documents()[0].raw_text, "a");
        assert!(!set.documents()[3].has_prefix());
    }

    #[test]
    fn ties_break_on_file_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "01-zeta.md", "");
        touch(dir.path(), "1-alpha.md", "");
        touch(dir.path(), "zz.md", "");
        touch(dir.path(), "aa.md", "");

        let set = discover(dir.path()).unwrap();
        assert_eq!(set.names(), vec!["01-zeta.md", "1-alpha.md", "aa.md", "zz.md"]);
    }

    #[test]
    fn ignores_non_markdown_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "01-a.md", "");
        touch(dir.path(), "02-b.MD", "");
        touch(dir.path(), "notes.txt", "");
        touch(dir.path(), "image.png", "");
        std::fs::create_dir(dir.path().join("03-sub.md")).unwrap();

        let set = discover(dir.path()).unwrap();
        assert_eq!(set.names(), vec!["01-a.md", "02-b.MD"]);
    }

    #[test]
    fn discovery_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.md", "3-c.md", "a.md", "03-a.md", "1-z.md"] {
            touch(dir.path(), name, name);
        }
        assert_eq!(discover(dir.path()).unwrap(), discover(dir.path()).unwrap());
    }

    #[test]
    fn missing_folder_is_invalid() {
        let err = discover("/definitely/not/a/folder").unwrap_err();
        assert!(matches!(err, BriefingError::InvalidFolder { .. }));
    }

    #[test]
    fn file_path_is_invalid_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.md", "");
        let err = discover(dir.path().join("a.md")).unwrap_err();
        assert!(matches!(err, BriefingError::InvalidFolder { .. }));
    }

    #[test]
    fn empty_folder_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn append_placeholder_adds_directive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.md", "# Title");
        let path = dir.path().join("a.md");
        append_image_placeholder(&path, "seal").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Title\n[[image:seal]]");
        assert!(append_image_placeholder(&path, "bad]]name").is_err());
        assert!(append_image_placeholder(&dir.path().join("missing.md"), "x").is_err());
    }
}
