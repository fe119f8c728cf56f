//! Configuration types for briefing-book builds.
//!
//! [`RenderConfig`] is the persisted, user-editable description of one
//! briefing book: where the Markdown lives, where the PDF goes, and how the
//! cover, running header and running footer look. It round-trips through a
//! YAML document with nested `cover`, `header` and `footer` sections.
//!
//! Loading is lenient: missing keys fall back to defaults field by field,
//! unknown keys are kept in `extra` maps so a save never drops data written
//! by a newer tool, and an unusable `input_folder` is reset to the default.
//!
//! Runtime collaborators (image resolver, renderers, progress callback)
//! are not part of this struct; they live in [`crate::build::BuildOptions`].

use crate::error::BriefingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default input folder, relative to the working directory.
pub const DEFAULT_INPUT_FOLDER: &str = "inputs/";
/// Default output PDF path.
pub const DEFAULT_OUTPUT_FILE: &str = "machine_corps_policy_package.pdf";
/// Default font for every styled line.
pub const DEFAULT_FONT: &str = "Times New Roman";
/// Default cover background colour. Also the literal the base stylesheet carries.
pub const DEFAULT_COVER_BG: &str = "#0b2545";
/// Default cover top padding in points.
pub const DEFAULT_COVER_PADDING_TOP: f32 = 180.0;
/// Default header/footer band height in points.
pub const DEFAULT_BAND_HEIGHT: f32 = 20.0;
/// Default header/footer text colour.
pub const DEFAULT_BAND_COLOR: &str = "#000000";

type Extra = BTreeMap<String, serde_yaml::Value>;

// ── Styled lines ─────────────────────────────────────────────────────────

/// Horizontal alignment of a [`StyledLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

impl Align {
    /// The CSS `text-align` keyword.
    pub fn as_css(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }
}

/// One line of text on the cover, in the header, or in the footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledLine {
    pub text: String,
    #[serde(default)]
    pub align: Align,
    #[serde(rename = "font", default = "default_font")]
    pub font_family: String,
    #[serde(rename = "size", default = "default_size")]
    pub size_pt: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

fn default_font() -> String {
    DEFAULT_FONT.to_string()
}

fn default_size() -> f32 {
    12.0
}

impl StyledLine {
    /// A centred, regular-weight line in the default font.
    pub fn new(text: impl Into<String>, size_pt: f32) -> Self {
        Self {
            text: text.into(),
            align: Align::Center,
            font_family: default_font(),
            size_pt,
            bold: false,
            italic: false,
        }
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    pub fn font(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// The full-page cover block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverBlock {
    pub lines: Vec<StyledLine>,
    pub bg_color: String,
    pub padding_top: f32,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for CoverBlock {
    fn default() -> Self {
        Self {
            lines: vec![
                StyledLine::new("THE MACHINE CORPS INITIATIVE", 56.0).bold(true),
                StyledLine::new("COMPLETE POLICY PACKAGE", 28.0),
                StyledLine::new("January 20, 2026", 18.0),
            ],
            bg_color: DEFAULT_COVER_BG.to_string(),
            padding_top: DEFAULT_COVER_PADDING_TOP,
            extra: Extra::new(),
        }
    }
}

/// A running header or footer band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandBlock {
    pub lines: Vec<StyledLine>,
    pub height: f32,
    pub color: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl BandBlock {
    fn with_lines(lines: Vec<StyledLine>) -> Self {
        Self {
            lines,
            height: DEFAULT_BAND_HEIGHT,
            color: DEFAULT_BAND_COLOR.to_string(),
            extra: Extra::new(),
        }
    }

    /// Default running header.
    pub fn default_header() -> Self {
        Self::with_lines(vec![StyledLine::new(
            "The Machine Corps Initiative – Complete Policy Package",
            10.0,
        )])
    }

    /// Default running footer; `{page}` becomes the live page number.
    pub fn default_footer() -> Self {
        Self::with_lines(vec![StyledLine::new("Page {page}", 10.0)])
    }
}

// ── RenderConfig ─────────────────────────────────────────────────────────

/// Everything needed to assemble one briefing book.
///
/// Built with [`RenderConfig::default()`], [`RenderConfig::builder()`], or
/// loaded from YAML with [`RenderConfig::load`].
///
/// # Example
/// ```rust
/// use briefing_book::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .input_folder("briefs/")
///     .output_file("book.pdf")
///     .classification("CUI")
///     .build()
///     .unwrap();
/// assert_eq!(config.classification, "CUI");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct RenderConfig {
    /// Folder scanned for `.md` documents.
    pub input_folder: PathBuf,
    /// Destination PDF.
    pub output_file: PathBuf,
    /// Classification marking. Empty removes the banner entirely.
    pub classification: String,
    /// Skip the primary renderer and go straight to the fallback toolchain.
    pub use_latex_fallback: bool,
    pub cover: CoverBlock,
    pub header: BandBlock,
    pub footer: BandBlock,
    /// Keys this version does not understand, kept for round-tripping.
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from(DEFAULT_INPUT_FOLDER),
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            classification: String::new(),
            use_latex_fallback: false,
            cover: CoverBlock::default(),
            header: BandBlock::default_header(),
            footer: BandBlock::default_footer(),
            extra: Extra::new(),
        }
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse YAML text. Missing keys take defaults; unknown keys are kept.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Serialise to YAML text.
    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load the configuration at `path`.
    ///
    /// When the file does not exist it is created with defaults. An
    /// `input_folder` that does not name an existing directory is reset to
    /// [`DEFAULT_INPUT_FOLDER`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BriefingError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} not found – creating with defaults", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let text = std::fs::read_to_string(path).map_err(|e| BriefingError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let mut config = Self::from_yaml_str(&text).map_err(|e| BriefingError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        if !config.input_folder.is_dir() {
            warn!(
                "Invalid input_folder '{}' – resetting to default",
                config.input_folder.display()
            );
            config.input_folder = PathBuf::from(DEFAULT_INPUT_FOLDER);
        }

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Persist to `path` atomically (temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BriefingError> {
        let path = path.as_ref();
        let yaml = self.to_yaml_string().map_err(|e| BriefingError::ConfigSave {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BriefingError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let tmp_path = path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, yaml).map_err(|e| BriefingError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| BriefingError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn input_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.config.input_folder = folder.into();
        self
    }

    pub fn output_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.config.output_file = file.into();
        self
    }

    pub fn classification(mut self, marking: impl Into<String>) -> Self {
        self.config.classification = marking.into();
        self
    }

    pub fn use_latex_fallback(mut self, v: bool) -> Self {
        self.config.use_latex_fallback = v;
        self
    }

    pub fn cover_lines(mut self, lines: Vec<StyledLine>) -> Self {
        self.config.cover.lines = lines;
        self
    }

    pub fn cover_bg_color(mut self, color: impl Into<String>) -> Self {
        self.config.cover.bg_color = color.into();
        self
    }

    pub fn cover_padding_top(mut self, pt: f32) -> Self {
        self.config.cover.padding_top = pt.max(0.0);
        self
    }

    pub fn header_lines(mut self, lines: Vec<StyledLine>) -> Self {
        self.config.header.lines = lines;
        self
    }

    pub fn header_height(mut self, pt: f32) -> Self {
        self.config.header.height = pt.max(0.0);
        self
    }

    pub fn header_color(mut self, color: impl Into<String>) -> Self {
        self.config.header.color = color.into();
        self
    }

    pub fn footer_lines(mut self, lines: Vec<StyledLine>) -> Self {
        self.config.footer.lines = lines;
        self
    }

    pub fn footer_height(mut self, pt: f32) -> Self {
        self.config.footer.height = pt.max(0.0);
        self
    }

    pub fn footer_color(mut self, color: impl Into<String>) -> Self {
        self.config.footer.color = color.into();
        self
    }

    /// Build the configuration, validating colour values.
    pub fn build(self) -> Result<RenderConfig, BriefingError> {
        let c = &self.config;
        for (field, value) in [
            ("cover.bg_color", &c.cover.bg_color),
            ("header.color", &c.header.color),
            ("footer.color", &c.footer.color),
        ] {
            if !is_css_color(value) {
                return Err(BriefingError::InvalidConfig(format!(
                    "{field} must be a CSS colour, got {value:?}"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa` and bare colour keywords.
fn is_css_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => {
            matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic()),
    }
}

// ── Lenient deserialisation ──────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    input_folder: Option<serde_yaml::Value>,
    output_file: Option<PathBuf>,
    classification: Option<String>,
    use_latex_fallback: Option<bool>,
    cover: Option<RawCover>,
    header: Option<RawBand>,
    footer: Option<RawBand>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCover {
    lines: Option<Vec<StyledLine>>,
    bg_color: Option<String>,
    padding_top: Option<f32>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawBand {
    lines: Option<Vec<StyledLine>>,
    height: Option<f32>,
    color: Option<String>,
    #[serde(flatten)]
    extra: Extra,
}

impl RawBand {
    fn merge_into(self, mut base: BandBlock) -> BandBlock {
        if let Some(lines) = self.lines {
            base.lines = lines;
        }
        if let Some(height) = self.height {
            base.height = height;
        }
        if let Some(color) = self.color {
            base.color = color;
        }
        base.extra = self.extra;
        base
    }
}

impl From<RawConfig> for RenderConfig {
    fn from(raw: RawConfig) -> Self {
        let mut config = RenderConfig::default();

        match raw.input_folder {
            Some(serde_yaml::Value::String(s)) if !s.trim().is_empty() => {
                config.input_folder = PathBuf::from(s);
            }
            Some(serde_yaml::Value::Null) | None => {}
            Some(other) => {
                warn!("Malformed input_folder {other:?} – resetting to default");
            }
        }
        if let Some(output) = raw.output_file {
            config.output_file = output;
        }
        if let Some(marking) = raw.classification {
            config.classification = marking;
        }
        if let Some(v) = raw.use_latex_fallback {
            config.use_latex_fallback = v;
        }
        if let Some(cover) = raw.cover {
            if let Some(lines) = cover.lines {
                config.cover.lines = lines;
            }
            if let Some(bg) = cover.bg_color {
                config.cover.bg_color = bg;
            }
            if let Some(pt) = cover.padding_top {
                config.cover.padding_top = pt;
            }
            config.cover.extra = cover.extra;
        }
        if let Some(header) = raw.header {
            config.header = header.merge_into(config.header);
        }
        if let Some(footer) = raw.footer {
            config.footer = footer.merge_into(config.footer);
        }
        config.extra = raw.extra;
        config
    }
}
