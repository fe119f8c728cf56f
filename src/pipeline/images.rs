//! Image placeholder resolution.
//!
//! Markdown sources reference images symbolically as `[[image:<name>]]`.
//! The converter never decides how a name becomes pixels: it asks an
//! injected [`ImageResolver`]. Batch and test callers supply a
//! [`MapResolver`] or [`DirectoryResolver`]; an interactive host can
//! implement the trait over whatever prompt it has. A resolver that returns
//! `Ok(None)` makes the build fail with
//! [`BriefingError::UnresolvedPlaceholder`].
//!
//! Resolved images are embedded as `data:` URIs so the composed HTML is
//! self-contained and renders the same in every engine.

use crate::error::BriefingError;
use base64::Engine as _;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Candidate extensions tried by [`DirectoryResolver`], in order.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// An image ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ResolvedImage {
    /// Read `path` and detect its MIME type from the extension.
    pub fn from_file(name: &str, path: &Path) -> Result<Self, BriefingError> {
        let bytes = std::fs::read(path).map_err(|e| BriefingError::ImageRead {
            name: name.to_string(),
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            mime: mime_for_path(path),
            bytes,
        })
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// MIME type for an image file, by extension.
pub fn mime_for_path(path: &Path) -> String {
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
    if is_svg {
        return "image/svg+xml".to_string();
    }
    image::ImageFormat::from_path(path)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// Turns a placeholder name into an image.
///
/// Must be `Send + Sync`: conversion runs on a blocking worker thread.
pub trait ImageResolver: Send + Sync {
    /// `Ok(None)` means "no image by that name"; `Err` means the image was
    /// found but could not be loaded.
    fn resolve(&self, name: &str) -> Result<Option<ResolvedImage>, BriefingError>;
}

/// Shared resolver handle.
pub type SharedResolver = Arc<dyn ImageResolver>;

/// Resolves nothing. The default for batch builds, so any placeholder
/// surfaces as an explicit error.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectResolver;

impl ImageResolver for RejectResolver {
    fn resolve(&self, _name: &str) -> Result<Option<ResolvedImage>, BriefingError> {
        Ok(None)
    }
}

enum MapEntry {
    File(PathBuf),
    Inline(ResolvedImage),
}

/// Pre-registered name → image mapping.
#[derive(Default)]
pub struct MapResolver {
    entries: HashMap<String, MapEntry>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `name` to a file read at resolution time.
    pub fn with_file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(name.into(), MapEntry::File(path.into()));
        self
    }

    /// Map `name` to bytes already in memory.
    pub fn with_bytes(
        mut self,
        name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.entries.insert(
            name.into(),
            MapEntry::Inline(ResolvedImage {
                mime: mime.into(),
                bytes,
            }),
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ImageResolver for MapResolver {
    fn resolve(&self, name: &str) -> Result<Option<ResolvedImage>, BriefingError> {
        match self.entries.get(name) {
            Some(MapEntry::File(path)) => ResolvedImage::from_file(name, path).map(Some),
            Some(MapEntry::Inline(img)) => Ok(Some(img.clone())),
            None => Ok(None),
        }
    }
}

/// Looks up `<dir>/<name>` verbatim, then `<dir>/<name>.<ext>` for each of
/// [`IMAGE_EXTENSIONS`].
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    dir: PathBuf,
}

impl DirectoryResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidate(&self, name: &str) -> Option<PathBuf> {
        // Names are symbolic, never paths: refuse anything that could walk out of `dir`.
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." || name == "." {
            return None;
        }
        let direct = self.dir.join(name);
        if direct.is_file() && direct.extension().is_some() {
            return Some(direct);
        }
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{name}.{ext}")))
            .find(|p| p.is_file())
    }
}

impl ImageResolver for DirectoryResolver {
    fn resolve(&self, name: &str) -> Result<Option<ResolvedImage>, BriefingError> {
        match self.candidate(name) {
            Some(path) => {
                debug!("Resolved [[image:{}]] → {}", name, path.display());
                ResolvedImage::from_file(name, &path).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Tries each resolver in turn; the first hit wins.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<SharedResolver>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, resolver: SharedResolver) -> Self {
        self.resolvers.push(resolver);
        self
    }
}

impl ImageResolver for ChainResolver {
    fn resolve(&self, name: &str) -> Result<Option<ResolvedImage>, BriefingError> {
        for resolver in &self.resolvers {
            if let Some(img) = resolver.resolve(name)? {
                return Ok(Some(img));
            }
        }
        Ok(None)
    }
}

impl<F> ImageResolver for F
where
    F: Fn(&str) -> Result<Option<ResolvedImage>, BriefingError> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Result<Option<ResolvedImage>, BriefingError> {
        self(name)
    }
}
