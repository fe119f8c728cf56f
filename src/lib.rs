//! # briefing-book
//!
//! Assemble a folder of Markdown files into one print-ready PDF briefing
//! book: cover page, running header and footer, table of contents, optional
//! classification banner.
//!
//! ## Why HTML in the middle?
//!
//! Markdown has no notion of pages. Converting every document to HTML and
//! composing a single document lets one print stylesheet (`@page` rules,
//! running elements, page counters) control the whole layout, and any
//! HTML+CSS engine can turn it into a PDF. When the primary engine is not
//! installed or fails, the same document goes through a LaTeX toolchain.
//!
//! ## Pipeline Overview
//!
//! ```text
//! inputs/
//!  │
//!  ├─ 1. Discover  Markdown files ordered by numeric prefix, then name
//!  ├─ 2. Convert   Markdown → HTML, page breaks, embedded images
//!  ├─ 3. Compose   header + cover + TOC + body + footer
//!  ├─ 4. Style     configuration merged into the print stylesheet
//!  └─ 5. Render    weasyprint, falling back to pandoc + xelatex; SHA-256
//! ```
//!
//! Files are put in order on disk by [`reorder::ReorderEngine`], which
//! renames them with zero-padded prefixes and can undo the last apply.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use briefing_book::{build, BuildOptions, RenderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RenderConfig::load("config.yaml")?;
//!     let output = build(&config, &BuildOptions::default()).await?;
//!     println!("{} ({})", output.render.output_path.display(), output.render.sha256);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `briefbook` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! briefing-book = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Role |
//! |------|------|
//! | `weasyprint` | primary HTML+CSS → PDF engine |
//! | `pandoc` + `xelatex` | fallback toolchain |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod build;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod reorder;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use build::{
    build, build_sync, export_html, preview_html, BuildController, BuildOptions, BuildOutput,
    BuildStats, CancelFlag,
};
pub use config::{Align, BandBlock, CoverBlock, RenderConfig, RenderConfigBuilder, StyledLine};
pub use error::{BriefingError, RenameError, RenderError};
pub use pipeline::compose::{compose, ComposedDocument, TocEntry};
pub use pipeline::discover::{append_image_placeholder, discover, Document, OrderedSet};
pub use pipeline::images::{
    ChainResolver, DirectoryResolver, ImageResolver, MapResolver, RejectResolver, ResolvedImage,
    SharedResolver,
};
pub use pipeline::markdown::convert;
pub use pipeline::render::{
    PandocEngine, PdfEngine, RenderJob, RenderPipeline, RenderResult, WeasyPrintEngine,
};
pub use pipeline::style::{resolve_default_styles, resolve_styles};
pub use progress::{BuildProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reorder::{RenameOutcome, RenameReport, RenameStatus, ReorderEngine, UndoReport};
pub use session::Session;
