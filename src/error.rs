//! Error types for the briefing-book library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`BriefingError`] — **Fatal**: the build cannot proceed (missing input
//!   folder, unresolved image placeholder, both renderers failed). Returned
//!   as `Err(BriefingError)` from every pipeline entry point.
//!
//! * [`RenameError`] — **Non-fatal**: a single file could not be renamed
//!   while applying a new order. Stored inside
//!   [`crate::reorder::RenameOutcome`] so callers see partial completion
//!   instead of losing the whole batch to one locked file.
//!
//! * [`RenderError`] — **One engine attempt** failed. A primary failure only
//!   switches the pipeline to the fallback toolchain; it becomes part of a
//!   fatal [`BriefingError`] once the fallback fails too.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the briefing-book library.
#[derive(Debug, Error)]
pub enum BriefingError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input folder is missing or is not a directory.
    #[error("Invalid input folder: '{path}'\nCheck the path exists and is a directory.")]
    InvalidFolder { path: PathBuf },

    /// A Markdown document could not be read.
    #[error("Failed to read document '{path}': {source}")]
    DocumentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An `[[image:<name>]]` placeholder had no resolution.
    #[error("Unresolved image placeholder '[[image:{name}]]' in '{document}'\nRegister the image or supply an image folder.")]
    UnresolvedPlaceholder { name: String, document: String },

    /// A resolver found an image file but it could not be read.
    #[error("Failed to read image '{name}' from '{path}': {source}")]
    ImageRead {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The primary renderer failed and the fallback toolchain is not installed.
    #[error("Fallback renderer '{engine}' is not available: {detail}\nPrimary renderer failed with: {primary}")]
    FallbackUnavailable {
        engine: String,
        detail: String,
        primary: String,
    },

    /// The primary renderer failed and the fallback attempt failed as well.
    #[error("PDF rendering failed: fallback '{engine}' error: {source}\nPrimary renderer failed with: {primary}")]
    RenderFailed {
        engine: String,
        primary: String,
        #[source]
        source: RenderError,
    },

    // ── Build control ─────────────────────────────────────────────────────
    /// Another build is already writing to this output path.
    #[error("A build for '{path}' is already in progress")]
    BuildInProgress { path: PathBuf },

    /// Files in this folder are being renamed; a build would read a
    /// half-renamed set.
    #[error("Files in '{path}' are being reordered")]
    ReorderInProgress { path: PathBuf },

    /// The build was cancelled before the named stage.
    #[error("Build cancelled before {stage}")]
    Cancelled { stage: &'static str },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file (PDF, HTML export, config).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The configuration file exists but is not valid YAML for this schema.
    #[error("Failed to load configuration '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    /// The configuration could not be serialised or written.
    #[error("Failed to save configuration '{path}': {detail}")]
    ConfigSave { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single file rename.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RenameError {
    /// The file to rename no longer exists.
    #[error("'{path}' no longer exists")]
    SourceMissing { path: PathBuf },

    /// The target name is already taken on disk; renaming would overwrite it.
    #[error("refusing to overwrite existing '{path}'")]
    TargetExists { path: PathBuf },

    /// The OS denied the rename.
    #[error("permission denied renaming '{from}' to '{to}'")]
    PermissionDenied { from: PathBuf, to: PathBuf },

    /// Any other OS error.
    #[error("failed to rename '{from}' to '{to}': {detail}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        detail: String,
    },
}

impl RenameError {
    pub(crate) fn from_io(from: PathBuf, to: PathBuf, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => RenameError::SourceMissing { path: from },
            std::io::ErrorKind::PermissionDenied => RenameError::PermissionDenied { from, to },
            std::io::ErrorKind::AlreadyExists => RenameError::TargetExists { path: to },
            _ => RenameError::Io {
                from,
                to,
                detail: err.to_string(),
            },
        }
    }
}

/// Failure of a single PDF engine attempt.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The engine's executable is not installed or does not run.
    #[error("{engine} is not available: {detail}")]
    Unavailable { engine: String, detail: String },

    /// The engine process could not be started.
    #[error("failed to start {engine}: {source}")]
    Spawn {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited unsuccessfully.
    #[error("{engine} exited with status {code}: {stderr}")]
    ExitStatus {
        engine: String,
        code: i32,
        stderr: String,
    },

    /// The engine reported success but produced no bytes.
    #[error("{engine} produced an empty PDF")]
    EmptyOutput { engine: String },

    /// Primary rendering was skipped because the configuration forces fallback.
    #[error("primary renderer skipped: fallback forced by configuration")]
    Forced,

    /// Staging or scratch file I/O failed around the engine call.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}
