//! Progress-callback trait for build events.
//!
//! Inject an [`Arc<dyn BuildProgressCallback>`] via
//! [`crate::build::BuildOptions::progress`] to observe a build as it moves
//! through discovery, conversion and rendering. Events are a side channel:
//! they never influence control flow, and an unobserved event is simply
//! dropped.
//!
//! The render stage emits exactly three milestones: started
//! ([`BuildProgressCallback::on_render_start`]), switched to fallback
//! ([`BuildProgressCallback::on_fallback`], only when the primary fails) and
//! complete ([`BuildProgressCallback::on_render_complete`]).
//!
//! # Example
//!
//! ```rust
//! use briefing_book::BuildProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl BuildProgressCallback for CountingCallback {
//!     fn on_document_converted(&self, index: usize, total: usize, name: &str) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {}", index + 1, total, name);
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the build pipeline at each milestone.
///
/// Implementations must be `Send + Sync`: conversion and rendering run on
/// blocking worker threads. Methods must return quickly; a slow observer
/// delays the build. All methods default to no-ops.
pub trait BuildProgressCallback: Send + Sync {
    /// Called once discovery has found the documents for this build.
    fn on_build_start(&self, documents: usize) {
        let _ = documents;
    }

    /// Called after each document has been converted to HTML.
    ///
    /// # Arguments
    /// * `index` — 0-based position in the ordered set
    /// * `total` — number of documents in the build
    /// * `name`  — file name of the document
    fn on_document_converted(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called just before the primary renderer is invoked (or skipped).
    fn on_render_start(&self, engine: &str) {
        let _ = engine;
    }

    /// Called when the pipeline switches to the fallback toolchain.
    ///
    /// # Arguments
    /// * `engine` — name of the fallback engine
    /// * `reason` — why the primary attempt did not produce a PDF
    fn on_fallback(&self, engine: &str, reason: &str) {
        let _ = (engine, reason);
    }

    /// Called once the PDF is in place and hashed.
    fn on_render_complete(&self, output: &Path, sha256: &str) {
        let _ = (output, sha256);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BuildProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::build::BuildOptions`].
pub type ProgressCallback = Arc<dyn BuildProgressCallback>;
