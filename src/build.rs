//! End-to-end build entry points.
//!
//! ```text
//! discover ─▶ convert (per document) ─▶ compose ─▶ styles ─▶ render
//!    ▲              ▲                                         ▲
//!    └─ cancel ─────┴─ checked here ─────────────────────────┘
//! ```
//!
//! A build works on a private snapshot of the [`RenderConfig`] taken when it
//! starts; later edits by the caller are not observed. At most one build may
//! target a given output path at a time, enforced by a [`BuildController`].
//! Cancellation is cooperative: a [`CancelFlag`] is checked between stages
//! and between documents, never while an engine is running.

use crate::config::RenderConfig;
use crate::error::BriefingError;
use crate::pipeline::compose::{self, ComposedDocument};
use crate::pipeline::discover::{self, OrderedSet};
use crate::pipeline::images::{RejectResolver, SharedResolver};
use crate::pipeline::render::{RenderJob, RenderPipeline, RenderResult};
use crate::pipeline::style;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Title used when neither the options nor the cover provide one.
pub const DEFAULT_TITLE: &str = "Briefing Book";

static GLOBAL_BUILDS: Lazy<BuildController> = Lazy::new(BuildController::new);

// ── Cancellation ─────────────────────────────────────────────────────────

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, stage: &'static str) -> Result<(), BriefingError> {
        if self.is_cancelled() {
            info!("Build cancelled before {}", stage);
            return Err(BriefingError::Cancelled { stage });
        }
        Ok(())
    }
}

fn check_cancel(cancel: Option<&CancelFlag>, stage: &'static str) -> Result<(), BriefingError> {
    cancel.map_or(Ok(()), |c| c.check(stage))
}

// ── Single-flight ────────────────────────────────────────────────────────

/// Admits at most one build per output path.
#[derive(Debug, Clone, Default)]
pub struct BuildController {
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Held for the duration of one build; releases the output path on drop.
#[derive(Debug)]
pub struct BuildGuard {
    key: PathBuf,
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.key);
        debug!("Released build slot for {}", self.key.display());
    }
}

impl BuildController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The controller shared by builds that don't bring their own.
    pub fn global() -> &'static BuildController {
        &GLOBAL_BUILDS
    }

    /// Claim `output` for one build.
    ///
    /// # Errors
    /// [`BriefingError::BuildInProgress`] when another build holds it.
    pub fn try_acquire(&self, output: &Path) -> Result<BuildGuard, BriefingError> {
        let key = output_key(output);
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.clone()) {
            return Err(BriefingError::BuildInProgress {
                path: output.to_path_buf(),
            });
        }
        Ok(BuildGuard {
            key,
            active: Arc::clone(&self.active),
        })
    }

    /// `true` while a build holds `output`.
    pub fn is_active(&self, output: &Path) -> bool {
        let key = output_key(output);
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key)
    }

    /// `true` while any build is running.
    pub fn any_active(&self) -> bool {
        !self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Canonical identity of an output path that may not exist yet.
fn output_key(path: &Path) -> PathBuf {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if let (Some(parent), Some(name)) = (abs.parent(), abs.file_name()) {
        if let Ok(canonical) = parent.canonicalize() {
            return canonical.join(name);
        }
    }
    abs
}

// ── Options / output ─────────────────────────────────────────────────────

/// Runtime collaborators for one build. Nothing here is persisted.
#[derive(Clone)]
pub struct BuildOptions {
    /// Resolves `[[image:…]]` placeholders. Default: [`RejectResolver`].
    pub resolver: SharedResolver,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<CancelFlag>,
    /// Stylesheet template replacing the bundled one.
    pub stylesheet: Option<String>,
    pub pipeline: RenderPipeline,
    /// Document title. Default: the first cover line.
    pub title: Option<String>,
    /// Single-flight controller. Default: [`BuildController::global`].
    pub controller: Option<BuildController>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            resolver: Arc::new(RejectResolver),
            progress: None,
            cancel: None,
            stylesheet: None,
            pipeline: RenderPipeline::default(),
            title: None,
            controller: None,
        }
    }
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .field("stylesheet", &self.stylesheet.as_ref().map(|s| s.len()))
            .field("pipeline", &self.pipeline)
            .field("title", &self.title)
            .finish()
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolver(mut self, resolver: SharedResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn stylesheet(mut self, template: impl Into<String>) -> Self {
        self.stylesheet = Some(template.into());
        self
    }

    pub fn pipeline(mut self, pipeline: RenderPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn controller(mut self, controller: BuildController) -> Self {
        self.controller = Some(controller);
        self
    }
}

/// Wall-clock time spent per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub discover_ms: u64,
    pub convert_ms: u64,
    pub render_ms: u64,
    pub total_ms: u64,
}

/// A finished build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
    pub render: RenderResult,
    /// Input documents in build order.
    pub documents: Vec<PathBuf>,
    /// Number of table-of-contents entries.
    pub headings: usize,
    pub stats: BuildStats,
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Composed document and resolved stylesheet, ready to render.
struct Prepared {
    documents: OrderedSet,
    composed: ComposedDocument,
    css: String,
    title: String,
}

async fn prepare(
    config: Arc<RenderConfig>,
    options: &BuildOptions,
    stats: &mut BuildStats,
) -> Result<Prepared, BriefingError> {
    let cancel = options.cancel.clone();

    // ── Step 1: Discover ─────────────────────────────────────────────────
    check_cancel(cancel.as_ref(), "discovery")?;
    let discover_start = Instant::now();
    let folder = config.input_folder.clone();
    let documents = tokio::task::spawn_blocking(move || discover::discover(&folder))
        .await
        .map_err(|e| BriefingError::Internal(format!("Discovery task panicked: {}", e)))??;
    stats.discover_ms = discover_start.elapsed().as_millis() as u64;

    let total = documents.len();
    if let Some(ref cb) = options.progress {
        cb.on_build_start(total);
    }

    // ── Step 2: Convert each document ────────────────────────────────────
    check_cancel(cancel.as_ref(), "document conversion")?;
    let convert_start = Instant::now();
    let resolver = Arc::clone(&options.resolver);
    let progress = options.progress.clone();
    let (documents, body) = tokio::task::spawn_blocking(move || {
        let body = compose::render_body(&documents, resolver.as_ref(), |index, name| {
            if let Some(ref cb) = progress {
                cb.on_document_converted(index, total, name);
            }
            if index + 1 < total {
                check_cancel(cancel.as_ref(), "document conversion")?;
            }
            Ok(())
        })?;
        Ok::<_, BriefingError>((documents, body))
    })
    .await
    .map_err(|e| BriefingError::Internal(format!("Conversion task panicked: {}", e)))??;
    stats.convert_ms = convert_start.elapsed().as_millis() as u64;
    debug!("Converted {} documents in {}ms", total, stats.convert_ms);

    // ── Step 3: Compose ──────────────────────────────────────────────────
    let composed = compose::compose_body(body, total, &config);

    // ── Step 4: Resolve styles ───────────────────────────────────────────
    let template = options
        .stylesheet
        .as_deref()
        .unwrap_or(style::BASE_STYLESHEET);
    let css = style::resolve_styles(template, &config);

    let title = options
        .title
        .clone()
        .or_else(|| {
            config
                .cover
                .lines
                .first()
                .map(|l| l.text.trim().to_string())
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    Ok(Prepared {
        documents,
        composed,
        css,
        title,
    })
}

/// Build the PDF described by `config`.
///
/// # Errors
/// Fatal errors only. Discovery and conversion failures abort before
/// anything is written; render failures leave the output path untouched.
pub async fn build(
    config: &RenderConfig,
    options: &BuildOptions,
) -> Result<BuildOutput, BriefingError> {
    let total_start = Instant::now();
    let config = Arc::new(config.clone());
    build_snapshot(config, options, total_start).await
}

pub(crate) async fn build_snapshot(
    config: Arc<RenderConfig>,
    options: &BuildOptions,
    total_start: Instant,
) -> Result<BuildOutput, BriefingError> {
    let controller = options
        .controller
        .clone()
        .unwrap_or_else(|| BuildController::global().clone());
    let _guard = controller.try_acquire(&config.output_file)?;
    info!(
        "Starting build: {} → {}",
        config.input_folder.display(),
        config.output_file.display()
    );

    let mut stats = BuildStats::default();
    let prepared = prepare(Arc::clone(&config), options, &mut stats).await?;

    // ── Step 5: Render ───────────────────────────────────────────────────
    check_cancel(options.cancel.as_ref(), "render")?;
    let render_start = Instant::now();
    let headings = prepared.composed.toc_entries.len();
    let job = RenderJob::new(prepared.composed, prepared.css).with_title(prepared.title);
    let render = options
        .pipeline
        .render(
            job,
            &config.output_file,
            config.use_latex_fallback,
            options.progress.clone(),
        )
        .await?;
    stats.render_ms = render_start.elapsed().as_millis() as u64;
    stats.total_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Build complete: {} documents, {} headings, {}ms total",
        prepared.documents.len(),
        headings,
        stats.total_ms
    );

    Ok(BuildOutput {
        render,
        documents: prepared.documents.paths(),
        headings,
        stats,
    })
}

/// Synchronous wrapper around [`build`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_sync(
    config: &RenderConfig,
    options: &BuildOptions,
) -> Result<BuildOutput, BriefingError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BriefingError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build(config, options))
}

/// The standalone HTML a build would render, without rendering it.
pub async fn preview_html(
    config: &RenderConfig,
    options: &BuildOptions,
) -> Result<String, BriefingError> {
    let mut stats = BuildStats::default();
    let prepared = prepare(Arc::new(config.clone()), options, &mut stats).await?;
    Ok(prepared
        .composed
        .to_standalone_html(&prepared.css, &prepared.title))
}

/// Write the standalone HTML preview to `path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn export_html(
    config: &RenderConfig,
    options: &BuildOptions,
    path: impl AsRef<Path>,
) -> Result<PathBuf, BriefingError> {
    let html = preview_html(config, options).await?;
    let path = path.as_ref();
    let write_err = |e| BriefingError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("html.tmp");
    tokio::fs::write(&tmp_path, html.as_bytes())
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    info!("HTML preview written to {}", path.display());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::pipeline::images::MapResolver;
    use crate::pipeline::render::PdfEngine;
    use crate::progress::BuildProgressCallback;

    struct StubEngine;

    impl PdfEngine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }

        fn render(&self, job: &RenderJob, output: &Path) -> Result<(), RenderError> {
            let mut pdf = b"%PDF-1.7\n".to_vec();
            pdf.extend_from_slice(job.document.body.as_bytes());
            std::fs::write(output, pdf).map_err(|e| RenderError::Io {
                context: "stub".into(),
                source: e,
            })
        }
    }

    fn options() -> BuildOptions {
        BuildOptions::new()
            .pipeline(RenderPipeline::new(Arc::new(StubEngine), Arc::new(StubEngine)))
            .controller(BuildController::new())
    }

    fn workspace(files: &[(&str, &str)]) -> (tempfile::TempDir, RenderConfig) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("inputs");
        std::fs::create_dir(&input).unwrap();
        for (name, body) in files {
            std::fs::write(input.join(name), body).unwrap();
        }
        let config = RenderConfig::builder()
            .input_folder(&input)
            .output_file(dir.path().join("out/book.pdf"))
            .build()
            .unwrap();
        (dir, config)
    }

    #[tokio::test]
    async fn build_writes_pdf_in_order() {
        let (_dir, config) = workspace(&[("02-b.md", "# Beta"), ("1-a.md", "# Alpha")]);
        let out = build(&config, &options()).await.unwrap();

        assert_eq!(out.documents.len(), 2);
        assert!(out.documents[0].ends_with("1-a.md"));
        assert_eq!(out.headings, 2);
        assert_eq!(out.render.engine, "stub");

        let pdf = std::fs::read_to_string(&config.output_file).unwrap();
        let alpha = pdf.find(r#"id="alpha""#).unwrap();
        let beta = pdf.find(r#"id="beta""#).unwrap();
        assert!(alpha < beta);
    }

    #[tokio::test]
    async fn missing_folder_fails_before_render() {
        let (dir, mut config) = workspace(&[]);
        config.input_folder = dir.path().join("nope");
        let err = build(&config, &options()).await.unwrap_err();
        assert!(matches!(err, BriefingError::InvalidFolder { .. }));
        assert!(!config.output_file.exists());
    }

    #[tokio::test]
    async fn unresolved_image_aborts_without_output() {
        let (_dir, config) = workspace(&[("a.md", "[[image:seal]]")]);
        let err = build(&config, &options()).await.unwrap_err();
        assert!(matches!(err, BriefingError::UnresolvedPlaceholder { .. }));
        assert!(!config.output_file.exists());
    }

    #[tokio::test]
    async fn resolver_supplies_images() {
        let (_dir, config) = workspace(&[("a.md", "[[image:seal]]")]);
        let resolver = MapResolver::new().with_bytes("seal", "image/png", vec![1, 2, 3]);
        let opts = options().resolver(Arc::new(resolver));
        build(&config, &opts).await.unwrap();
        let pdf = std::fs::read_to_string(&config.output_file).unwrap();
        assert!(pdf.contains("data:image/png;base64,AQID"));
    }

    #[tokio::test]
    async fn cancelled_before_discovery() {
        let (_dir, config) = workspace(&[("a.md", "x")]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = build(&config, &options().cancel(cancel)).await.unwrap_err();
        assert!(matches!(err, BriefingError::Cancelled { stage: "discovery" }));
    }

    struct CancelAfterFirst(CancelFlag);

    impl BuildProgressCallback for CancelAfterFirst {
        fn on_document_converted(&self, _index: usize, _total: usize, _name: &str) {
            self.0.cancel();
        }
    }

    #[tokio::test]
    async fn cancelled_between_documents() {
        let (_dir, config) = workspace(&[("1-a.md", "a"), ("2-b.md", "b")]);
        let cancel = CancelFlag::new();
        let opts = options()
            .cancel(cancel.clone())
            .progress(Arc::new(CancelAfterFirst(cancel)));
        let err = build(&config, &opts).await.unwrap_err();
        assert!(matches!(
            err,
            BriefingError::Cancelled {
                stage: "document conversion"
            }
        ));
        assert!(!config.output_file.exists());
    }

    #[tokio::test]
    async fn cancelled_after_last_document_stops_before_render() {
        let (_dir, config) = workspace(&[("1-a.md", "a")]);
        let cancel = CancelFlag::new();
        let opts = options()
            .cancel(cancel.clone())
            .progress(Arc::new(CancelAfterFirst(cancel)));
        let err = build(&config, &opts).await.unwrap_err();
        assert!(matches!(err, BriefingError::Cancelled { stage: "render" }));
    }

    #[test]
    fn controller_rejects_second_build_for_same_output() {
        let dir = tempfile::tempdir().unwrap();
        let controller = BuildController::new();
        let out = dir.path().join("book.pdf");

        let guard = controller.try_acquire(&out).unwrap();
        assert!(controller.is_active(&out));
        let err = controller
            .try_acquire(&dir.path().join(".").join("book.pdf"))
            .unwrap_err();
        assert!(matches!(err, BriefingError::BuildInProgress { .. }));
        assert!(controller.try_acquire(&dir.path().join("other.pdf")).is_ok());

        drop(guard);
        assert!(!controller.is_active(&out));
        assert!(controller.try_acquire(&out).is_ok());
    }

    #[tokio::test]
    async fn build_fails_while_output_is_claimed() {
        let (_dir, config) = workspace(&[("a.md", "x")]);
        let controller = BuildController::new();
        let _held = controller.try_acquire(&config.output_file).unwrap();
        let err = build(&config, &options().controller(controller.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, BriefingError::BuildInProgress { .. }));
    }

    #[tokio::test]
    async fn preview_embeds_resolved_styles() {
        let (_dir, mut config) = workspace(&[("a.md", "# Title")]);
        config.classification = "CUI".into();
        let html = preview_html(&config, &options()).await.unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("content: \"CUI\";"));
        assert!(html.contains(r#"<h1 id="title">Title</h1>"#));
        assert!(!config.output_file.exists());
    }

    #[tokio::test]
    async fn custom_stylesheet_template() {
        let (_dir, config) = workspace(&[("a.md", "text")]);
        let opts = options().stylesheet("body { margin-top: 20pt; }").title("Custom");
        let html = preview_html(&config, &opts).await.unwrap();
        assert!(html.contains("body { margin-top: 40pt; }"));
        assert!(html.contains("<title>Custom</title>"));
    }

    #[tokio::test]
    async fn export_html_is_atomic() {
        let (dir, config) = workspace(&[("a.md", "text")]);
        let path = dir.path().join("preview/book.html");
        export_html(&config, &options(), &path).await.unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("<p>text</p>"));
        assert!(!path.with_extension("html.tmp").exists());
    }

    #[test]
    fn build_sync_runs_own_runtime() {
        let (_dir, config) = workspace(&[("a.md", "text")]);
        let out = build_sync(&config, &options()).unwrap();
        assert!(out.render.output_path.exists());
        assert!(out.stats.total_ms >= out.stats.render_ms);
    }
}
