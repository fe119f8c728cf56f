//! PDF rendering: primary engine, one fallback attempt, content hash.
//!
//! ```text
//!  Primary ──ok──────────────────────────┐
//!     │ fail / forced                     ▼
//!     ▼                                 Hashed ──▶ Done
//!  Fallback ──toolchain missing──▶ FallbackUnavailable
//!     │ fail                              ▲
//!     ▼                                   │ ok
//!  Failed                     Fallback ───┘
//! ```
//!
//! ## Why spawn_blocking?
//!
//! Both engines are external processes driven through `std::process`.
//! Waiting on them inside an async task would pin a Tokio worker for the
//! whole render, so the state machine runs on the blocking pool instead.
//!
//! ## No half-written PDFs
//!
//! Engines write into a staging file created next to the output. Only a
//! complete, non-empty, hashed PDF is renamed over the output path; on any
//! failure the staging file is dropped and the output path is untouched.

use crate::error::{BriefingError, RenderError};
use crate::pipeline::compose::ComposedDocument;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Input handed to a [`PdfEngine`].
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub document: ComposedDocument,
    pub css: String,
    pub title: String,
}

impl RenderJob {
    pub fn new(document: ComposedDocument, css: impl Into<String>) -> Self {
        Self {
            document,
            css: css.into(),
            title: "Briefing Book".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// The composed document with the stylesheet embedded.
    pub fn standalone_html(&self) -> String {
        self.document.to_standalone_html(&self.css, &self.title)
    }
}

/// An HTML+CSS → PDF engine.
///
/// Calls are blocking and treated as atomic: a build can't be cancelled
/// while one is running.
pub trait PdfEngine: Send + Sync {
    /// Short name used in logs, progress events and errors.
    fn name(&self) -> &str;

    /// Fail fast when the engine's toolchain is not installed.
    fn check_available(&self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Render `job` into `output`, replacing its contents.
    fn render(&self, job: &RenderJob, output: &Path) -> Result<(), RenderError>;
}

/// Shared engine handle.
pub type SharedEngine = Arc<dyn PdfEngine>;

// ── Process helpers ──────────────────────────────────────────────────────

fn spawn_error(engine: &str, err: std::io::Error) -> RenderError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RenderError::Unavailable {
            engine: engine.to_string(),
            detail: format!("executable not found ({err})"),
        }
    } else {
        RenderError::Spawn {
            engine: engine.to_string(),
            source: err,
        }
    }
}

fn exit_error(engine: &str, output: &std::process::Output) -> RenderError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    // Keep the tail: engines put the actual failure last.
    let tail: String = if stderr.chars().count() > 2000 {
        let skip = stderr.chars().count() - 2000;
        stderr.chars().skip(skip).collect()
    } else {
        stderr.to_string()
    };
    RenderError::ExitStatus {
        engine: engine.to_string(),
        code: output.status.code().unwrap_or(-1),
        stderr: tail,
    }
}

fn ensure_nonempty(engine: &str, path: &Path) -> Result<(), RenderError> {
    let len = std::fs::metadata(path)
        .map_err(|e| RenderError::Io {
            context: format!("stat {}", path.display()),
            source: e,
        })?
        .len();
    if len == 0 {
        return Err(RenderError::EmptyOutput {
            engine: engine.to_string(),
        });
    }
    Ok(())
}

// ── WeasyPrint (primary) ─────────────────────────────────────────────────

/// Primary engine: `weasyprint - <output>` with the standalone HTML on stdin.
#[derive(Debug, Clone)]
pub struct WeasyPrintEngine {
    program: PathBuf,
}

impl Default for WeasyPrintEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("weasyprint"),
        }
    }
}

impl WeasyPrintEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `weasyprint` on `PATH`.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl PdfEngine for WeasyPrintEngine {
    fn name(&self) -> &str {
        "weasyprint"
    }

    fn render(&self, job: &RenderJob, output: &Path) -> Result<(), RenderError> {
        let mut child = Command::new(&self.program)
            .args(["--encoding", "utf-8", "-"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(self.name(), e))?;

        let html = job.standalone_html();
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(html.as_bytes()))
        });

        let result = child.wait_with_output().map_err(|e| RenderError::Io {
            context: "waiting for weasyprint".to_string(),
            source: e,
        })?;
        if let Some(writer) = writer {
            // A broken pipe shows up in the exit status below.
            let _ = writer.join();
        }

        if !result.status.success() {
            return Err(exit_error(self.name(), &result));
        }
        debug!("weasyprint wrote {}", output.display());
        Ok(())
    }
}

// ── Pandoc (fallback) ────────────────────────────────────────────────────

/// Fallback toolchain: Pandoc with a LaTeX PDF engine.
///
/// HTML and CSS are written to a scratch [`TempDir`] that is removed when
/// the render returns, whatever pandoc's exit status.
#[derive(Debug, Clone)]
pub struct PandocEngine {
    program: PathBuf,
    pdf_engine: String,
    geometry: String,
    font_size: String,
    scratch_root: Option<PathBuf>,
}

impl Default for PandocEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pandoc"),
            pdf_engine: "xelatex".to_string(),
            geometry: "letterpaper,margin=1in".to_string(),
            font_size: "12pt".to_string(),
            scratch_root: None,
        }
    }
}

impl PandocEngine {
    pub const HTML_FILE: &'static str = "document.html";
    pub const CSS_FILE: &'static str = "document.css";

    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `pandoc` on `PATH`.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// LaTeX engine passed as `--pdf-engine`. Default: `xelatex`.
    pub fn pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.pdf_engine = engine.into();
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Arguments for one pandoc invocation, run inside the scratch directory.
    pub fn command_args(&self, output: &Path) -> Vec<OsString> {
        vec![
            Self::HTML_FILE.into(),
            format!("--pdf-engine={}", self.pdf_engine).into(),
            "-o".into(),
            output.as_os_str().to_os_string(),
            "--css".into(),
            Self::CSS_FILE.into(),
            "--variable".into(),
            format!("geometry={}", self.geometry).into(),
            "--variable".into(),
            format!("fontsize={}", self.font_size).into(),
        ]
    }

    fn scratch_dir(&self) -> Result<TempDir, RenderError> {
        let dir = match &self.scratch_root {
            Some(root) => tempfile::Builder::new().prefix("briefbook-").tempdir_in(root),
            None => tempfile::Builder::new().prefix("briefbook-").tempdir(),
        };
        dir.map_err(|e| RenderError::Io {
            context: "creating pandoc scratch directory".to_string(),
            source: e,
        })
    }
}

impl PdfEngine for PandocEngine {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn check_available(&self) -> Result<(), RenderError> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| RenderError::Unavailable {
                engine: self.name().to_string(),
                detail: format!("cannot run {}: {e}", self.program.display()),
            })?;
        if !status.success() {
            return Err(RenderError::Unavailable {
                engine: self.name().to_string(),
                detail: format!("{} --version exited with {status}", self.program.display()),
            });
        }
        Ok(())
    }

    fn render(&self, job: &RenderJob, output: &Path) -> Result<(), RenderError> {
        let scratch = self.scratch_dir()?;
        let html_path = scratch.path().join(Self::HTML_FILE);
        let css_path = scratch.path().join(Self::CSS_FILE);

        let html = format!(
            "<html><head><meta charset=\"utf-8\"><link rel=\"stylesheet\" href=\"{}\"></head><body>{}</body></html>",
            Self::CSS_FILE,
            job.document.fragments()
        );
        std::fs::write(&html_path, html).map_err(|e| RenderError::Io {
            context: format!("writing {}", html_path.display()),
            source: e,
        })?;
        std::fs::write(&css_path, &job.css).map_err(|e| RenderError::Io {
            context: format!("writing {}", css_path.display()),
            source: e,
        })?;

        let result = Command::new(&self.program)
            .args(self.command_args(output))
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| spawn_error(self.name(), e));

        // `scratch` is dropped on every path out of here, success or not.
        let result = result?;
        if !result.status.success() {
            return Err(exit_error(self.name(), &result));
        }
        debug!("pandoc wrote {}", output.display());
        Ok(())
    }
}

// ── Result ───────────────────────────────────────────────────────────────

/// Outcome of a successful render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    pub output_path: PathBuf,
    /// Hex SHA-256 of the PDF bytes. Recorded for verification, not used
    /// to decide success.
    pub sha256: String,
    /// Engine that produced the PDF.
    pub engine: String,
    pub used_fallback: bool,
    /// Why the primary engine did not produce the PDF, when fallback ran.
    pub fallback_reason: Option<String>,
    pub bytes: u64,
    pub duration_ms: u64,
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Ok(out)
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Primary engine plus fallback toolchain.
#[derive(Clone)]
pub struct RenderPipeline {
    primary: SharedEngine,
    fallback: SharedEngine,
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self {
            primary: Arc::new(WeasyPrintEngine::default()),
            fallback: Arc::new(PandocEngine::default()),
        }
    }
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl RenderPipeline {
    pub fn new(primary: SharedEngine, fallback: SharedEngine) -> Self {
        Self { primary, fallback }
    }

    pub fn primary(&self) -> &SharedEngine {
        &self.primary
    }

    pub fn fallback(&self) -> &SharedEngine {
        &self.fallback
    }

    /// Render `job` to `output`.
    ///
    /// With `force_fallback` the primary engine is never invoked. The
    /// fallback is attempted at most once.
    ///
    /// # Errors
    /// * [`BriefingError::FallbackUnavailable`] — primary failed, fallback not installed
    /// * [`BriefingError::RenderFailed`] — both attempts failed
    /// * [`BriefingError::OutputWriteFailed`] — staging or final rename failed
    pub async fn render(
        &self,
        job: RenderJob,
        output: &Path,
        force_fallback: bool,
        progress: Option<ProgressCallback>,
    ) -> Result<RenderResult, BriefingError> {
        let pipeline = self.clone();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || {
            pipeline.render_blocking(&job, &output, force_fallback, progress.as_ref())
        })
        .await
        .map_err(|e| BriefingError::Internal(format!("Render task panicked: {}", e)))?
    }

    /// Blocking implementation of [`RenderPipeline::render`].
    pub fn render_blocking(
        &self,
        job: &RenderJob,
        output: &Path,
        force_fallback: bool,
        progress: Option<&ProgressCallback>,
    ) -> Result<RenderResult, BriefingError> {
        let start = Instant::now();
        let write_err = |source: std::io::Error| BriefingError::OutputWriteFailed {
            path: output.to_path_buf(),
            source,
        };

        let output_abs = std::path::absolute(output).map_err(write_err)?;
        let parent = output_abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent).map_err(write_err)?;

        let staging = tempfile::Builder::new()
            .prefix(".briefbook-")
            .suffix(".pdf.partial")
            .tempfile_in(&parent)
            .map_err(write_err)?;
        let staging_path = staging.path().to_path_buf();

        // ── State: Primary ───────────────────────────────────────────────
        if let Some(cb) = progress {
            cb.on_render_start(self.primary.name());
        }
        let primary_result = if force_fallback {
            Err(RenderError::Forced)
        } else {
            info!("Rendering with {}", self.primary.name());
            self.primary
                .render(job, &staging_path)
                .and_then(|()| ensure_nonempty(self.primary.name(), &staging_path))
        };

        let (engine, fallback_reason) = match primary_result {
            Ok(()) => (self.primary.name().to_string(), None),
            Err(primary_err) => {
                // ── State: Fallback ──────────────────────────────────────
                let reason = primary_err.to_string();
                warn!(
                    "{} failed ({}); falling back to {}",
                    self.primary.name(),
                    reason,
                    self.fallback.name()
                );
                if let Some(cb) = progress {
                    cb.on_fallback(self.fallback.name(), &reason);
                }

                self.fallback.check_available().map_err(|e| {
                    BriefingError::FallbackUnavailable {
                        engine: self.fallback.name().to_string(),
                        detail: e.to_string(),
                        primary: reason.clone(),
                    }
                })?;

                self.fallback
                    .render(job, &staging_path)
                    .and_then(|()| ensure_nonempty(self.fallback.name(), &staging_path))
                    .map_err(|e| BriefingError::RenderFailed {
                        engine: self.fallback.name().to_string(),
                        primary: reason.clone(),
                        source: e,
                    })?;
                (self.fallback.name().to_string(), Some(reason))
            }
        };

        // ── State: Hashed ────────────────────────────────────────────────
        let sha256 = sha256_file(&staging_path).map_err(write_err)?;
        let bytes = std::fs::metadata(&staging_path).map_err(write_err)?.len();
        staging
            .persist(&output_abs)
            .map_err(|e| write_err(e.error))?;

        info!(
            "PDF generated: {} (SHA256: {}, {} bytes, via {})",
            output_abs.display(),
            sha256,
            bytes,
            engine
        );
        if let Some(cb) = progress {
            cb.on_render_complete(&output_abs, &sha256);
        }

        // ── State: Done ──────────────────────────────────────────────────
        Ok(RenderResult {
            output_path: output_abs,
            sha256,
            used_fallback: fallback_reason.is_some(),
            engine,
            fallback_reason,
            bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::pipeline::compose::compose;
    use crate::pipeline::discover::OrderedSet;
    use crate::pipeline::images::RejectResolver;
    use crate::progress::BuildProgressCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Test engine with a scripted outcome.
    struct FakeEngine {
        name: &'static str,
        available: bool,
        writes: Option<&'static [u8]>,
        calls: AtomicUsize,
    }

    impl FakeEngine {
        fn ok(name: &'static str, bytes: &'static [u8]) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: true,
                writes: Some(bytes),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: true,
                writes: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn missing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: false,
                writes: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PdfEngine for FakeEngine {
        fn name(&self) -> &str {
            self.name
        }

        fn check_available(&self) -> Result<(), RenderError> {
            if self.available {
                Ok(())
            } else {
                Err(RenderError::Unavailable {
                    engine: self.name.to_string(),
                    detail: "not installed".to_string(),
                })
            }
        }

        fn render(&self, _job: &RenderJob, output: &Path) -> Result<(), RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.writes {
                Some(bytes) => std::fs::write(output, bytes).map_err(|e| RenderError::Io {
                    context: "fake write".into(),
                    source: e,
                }),
                None => Err(RenderError::ExitStatus {
                    engine: self.name.to_string(),
                    code: 1,
                    stderr: "scripted failure".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct Milestones(Mutex<Vec<String>>);

    impl BuildProgressCallback for Milestones {
        fn on_render_start(&self, engine: &str) {
            self.0.lock().unwrap().push(format!("start:{engine}"));
        }
        fn on_fallback(&self, engine: &str, _reason: &str) {
            self.0.lock().unwrap().push(format!("fallback:{engine}"));
        }
        fn on_render_complete(&self, _output: &Path, _sha256: &str) {
            self.0.lock().unwrap().push("complete".into());
        }
    }

    fn job() -> RenderJob {
        let doc = compose(&OrderedSet::default(), &RenderConfig::default(), &RejectResolver).unwrap();
        RenderJob::new(doc, "body {}")
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn primary_success_is_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        let primary = FakeEngine::ok("primary", b"%PDF-1.7 primary");
        let fallback = FakeEngine::ok("fallback", b"%PDF-1.7 fallback");
        let pipeline = RenderPipeline::new(primary.clone(), fallback.clone());

        let result = pipeline.render_blocking(&job(), &out, false, None).unwrap();
        assert_eq!(result.engine, "primary");
        assert!(!result.used_fallback);
        assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-1.7 primary");
        assert_eq!(result.sha256, sha256_file(&out).unwrap());
        assert_eq!(result.sha256.len(), 64);
        assert_eq!(result.bytes, 16);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(leftovers(dir.path()), vec!["book.pdf"]);
    }

    #[test]
    fn primary_failure_uses_fallback_once() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        let primary = FakeEngine::failing("primary");
        let fallback = FakeEngine::ok("fallback", b"%PDF fallback");
        let pipeline = RenderPipeline::new(primary.clone(), fallback.clone());

        let result = pipeline.render_blocking(&job(), &out, false, None).unwrap();
        assert!(result.used_fallback);
        assert_eq!(result.engine, "fallback");
        assert!(result.fallback_reason.unwrap().contains("scripted failure"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[test]
    fn forced_fallback_skips_primary() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        let primary = FakeEngine::ok("primary", b"%PDF primary");
        let fallback = FakeEngine::ok("fallback", b"%PDF fallback");
        let pipeline = RenderPipeline::new(primary.clone(), fallback.clone());

        let result = pipeline.render_blocking(&job(), &out, true, None).unwrap();
        assert_eq!(primary.calls(), 0);
        assert_eq!(result.engine, "fallback");
        assert_eq!(std::fs::read(&out).unwrap(), b"%PDF fallback");
    }

    #[test]
    fn missing_fallback_fails_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        let fallback = FakeEngine::missing("fallback");
        let pipeline = RenderPipeline::new(FakeEngine::failing("primary"), fallback.clone());

        let err = pipeline.render_blocking(&job(), &out, false, None).unwrap_err();
        assert!(matches!(err, BriefingError::FallbackUnavailable { .. }), "{err}");
        assert_eq!(fallback.calls(), 0);
        assert!(!out.exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn both_failing_reports_fallback_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        let pipeline =
            RenderPipeline::new(FakeEngine::failing("primary"), FakeEngine::failing("fallback"));

        let err = pipeline.render_blocking(&job(), &out, false, None).unwrap_err();
        match err {
            BriefingError::RenderFailed { engine, primary, .. } => {
                assert_eq!(engine, "fallback");
                assert!(primary.contains("primary"));
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn empty_primary_output_triggers_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        let pipeline = RenderPipeline::new(
            FakeEngine::ok("primary", b""),
            FakeEngine::ok("fallback", b"%PDF ok"),
        );
        let result = pipeline.render_blocking(&job(), &out, false, None).unwrap();
        assert!(result.fallback_reason.unwrap().contains("empty"));
    }

    #[test]
    fn failed_render_keeps_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        std::fs::write(&out, b"previous").unwrap();
        let pipeline =
            RenderPipeline::new(FakeEngine::failing("primary"), FakeEngine::missing("fallback"));
        assert!(pipeline.render_blocking(&job(), &out, false, None).is_err());
        assert_eq!(std::fs::read(&out).unwrap(), b"previous");
    }

    #[test]
    fn milestones_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.pdf");
        let pipeline = RenderPipeline::new(
            FakeEngine::failing("primary"),
            FakeEngine::ok("fallback", b"%PDF"),
        );
        let milestones = Arc::new(Milestones::default());
        let cb: ProgressCallback = milestones.clone();
        pipeline.render_blocking(&job(), &out, false, Some(&cb)).unwrap();
        assert_eq!(
            *milestones.0.lock().unwrap(),
            vec!["start:primary", "fallback:fallback", "complete"]
        );
    }

    #[tokio::test]
    async fn async_render_runs_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/dir/book.pdf");
        let pipeline = RenderPipeline::new(
            FakeEngine::ok("primary", b"%PDF"),
            FakeEngine::missing("fallback"),
        );
        let result = pipeline.render(job(), &out, false, None).await.unwrap();
        assert!(result.output_path.ends_with("nested/dir/book.pdf"));
        assert!(out.exists());
    }

    #[test]
    fn pandoc_arguments_fix_page_geometry() {
        let args = PandocEngine::new().command_args(Path::new("/tmp/out.pdf"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[0], "document.html");
        assert!(args.contains(&"--pdf-engine=xelatex".to_string()));
        assert!(args.contains(&"geometry=letterpaper,margin=1in".to_string()));
        assert!(args.contains(&"fontsize=12pt".to_string()));
        assert!(args.contains(&"/tmp/out.pdf".to_string()));
    }

    #[test]
    fn missing_pandoc_is_unavailable() {
        let engine = PandocEngine::new().program("briefbook-no-such-pandoc-binary");
        assert!(matches!(
            engine.check_available(),
            Err(RenderError::Unavailable { .. })
        ));
    }

    #[test]
    fn missing_weasyprint_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = WeasyPrintEngine::new().program("briefbook-no-such-weasyprint-binary");
        let err = engine.render(&job(), &dir.path().join("x.pdf")).unwrap_err();
        assert!(matches!(err, RenderError::Unavailable { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn pandoc_scratch_files_removed_on_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // `false` ignores its arguments and exits 1.
        let engine = PandocEngine::new().program("false").scratch_root(scratch.path());
        let err = engine.render(&job(), &out.path().join("x.pdf")).unwrap_err();
        assert!(matches!(err, RenderError::ExitStatus { code: 1, .. }), "{err}");
        assert!(leftovers(scratch.path()).is_empty());
    }
}
