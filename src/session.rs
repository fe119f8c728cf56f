//! Long-lived session state for an interactive host.
//!
//! A [`Session`] owns the current [`RenderConfig`], the single-flight
//! [`BuildController`] and the [`ReorderEngine`] for the input folder.
//! Edits are copy-on-write: [`Session::update`] swaps in a new
//! `Arc<RenderConfig>`, so a build that already took its snapshot keeps
//! reading the old one.
//!
//! Builds and reorders exclude each other through one folder lock. A build
//! holds a shared guard from before discovery until the PDF is written; a
//! reorder or undo needs the exclusive guard. Neither side waits: a build
//! started during a reorder fails with [`BriefingError::ReorderInProgress`],
//! a reorder started during a build with [`BriefingError::BuildInProgress`].

use crate::build::{self, BuildController, BuildOptions, BuildOutput};
use crate::config::RenderConfig;
use crate::error::BriefingError;
use crate::reorder::{RenameReport, ReorderEngine, UndoReport};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tokio::sync::{RwLock as FolderLock, RwLockWriteGuard};
use tracing::debug;

pub struct Session {
    config_path: PathBuf,
    config: RwLock<Arc<RenderConfig>>,
    builds: BuildController,
    folder_access: FolderLock<()>,
    reorder: Mutex<ReorderEngine>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config_path", &self.config_path)
            .field("building", &self.is_building())
            .finish()
    }
}

impl Session {
    /// Load (or create) the configuration at `config_path`.
    pub fn open(config_path: impl Into<PathBuf>) -> Result<Self, BriefingError> {
        let config_path = config_path.into();
        let config = RenderConfig::load(&config_path)?;
        Ok(Self::with_config(config_path, config))
    }

    /// Start from an in-memory configuration; nothing is read from disk.
    pub fn with_config(config_path: impl Into<PathBuf>, config: RenderConfig) -> Self {
        let reorder = ReorderEngine::new(config.input_folder.clone());
        Self {
            config_path: config_path.into(),
            config: RwLock::new(Arc::new(config)),
            builds: BuildController::new(),
            folder_access: FolderLock::new(()),
            reorder: Mutex::new(reorder),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The configuration as of now. Later edits don't change it.
    pub fn snapshot(&self) -> Arc<RenderConfig> {
        let guard = self.config.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Apply `edit` to a copy of the configuration and publish it.
    pub fn update(&self, edit: impl FnOnce(&mut RenderConfig)) -> Arc<RenderConfig> {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut next = RenderConfig::clone(&guard);
        edit(&mut next);

        if next.input_folder != guard.input_folder {
            debug!("Input folder changed to {}", next.input_folder.display());
            self.reorder_engine().set_folder(next.input_folder.clone());
        }
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        next
    }

    /// Persist the current configuration to [`Session::config_path`].
    pub fn save(&self) -> Result<(), BriefingError> {
        self.snapshot().save(&self.config_path)
    }

    pub fn builds(&self) -> &BuildController {
        &self.builds
    }

    pub fn is_building(&self) -> bool {
        self.builds.any_active()
    }

    /// Build from a snapshot taken now.
    ///
    /// # Errors
    /// [`BriefingError::ReorderInProgress`] while a reorder or undo is
    /// renaming files, besides every error of [`build::build`].
    pub async fn build(&self, options: BuildOptions) -> Result<BuildOutput, BriefingError> {
        let start = Instant::now();
        let snapshot = self.snapshot();
        let _reading = self.folder_access.try_read().map_err(|_| {
            BriefingError::ReorderInProgress {
                path: snapshot.input_folder.clone(),
            }
        })?;
        let options = options.controller(self.builds.clone());
        build::build_snapshot(snapshot, &options, start).await
    }

    pub async fn preview_html(&self, options: &BuildOptions) -> Result<String, BriefingError> {
        build::preview_html(&self.snapshot(), options).await
    }

    // ── Reordering ───────────────────────────────────────────────────────

    pub fn current_order(&self) -> Result<Vec<PathBuf>, BriefingError> {
        self.reorder_engine().current_order()
    }

    pub fn stage_order<P: AsRef<Path>>(&self, new_order: &[P]) {
        self.reorder_engine().stage(new_order);
    }

    pub fn staged_order(&self) -> Option<Vec<PathBuf>> {
        self.reorder_engine().staged().map(<[PathBuf]>::to_vec)
    }

    pub fn apply_order<P: AsRef<Path>>(&self, new_order: &[P]) -> Result<RenameReport, BriefingError> {
        let _writing = self.exclusive_folder()?;
        self.reorder_engine().apply(new_order)
    }

    pub fn apply_staged(&self) -> Result<RenameReport, BriefingError> {
        let _writing = self.exclusive_folder()?;
        self.reorder_engine().apply_staged()
    }

    pub fn undo(&self) -> Result<UndoReport, BriefingError> {
        let _writing = self.exclusive_folder()?;
        Ok(self.reorder_engine().undo())
    }

    /// The exclusive folder guard, if no build holds the folder.
    ///
    /// Also refuses while a slot of [`Session::builds`] is taken directly
    /// through the controller.
    fn exclusive_folder(&self) -> Result<RwLockWriteGuard<'_, ()>, BriefingError> {
        let busy = || BriefingError::BuildInProgress {
            path: self.snapshot().input_folder.clone(),
        };
        let guard = self.folder_access.try_write().map_err(|_| busy())?;
        if self.is_building() {
            return Err(busy());
        }
        Ok(guard)
    }

    fn reorder_engine(&self) -> MutexGuard<'_, ReorderEngine> {
        self.reorder.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_in(dir: &Path) -> Session {
        let input = dir.join("inputs");
        std::fs::create_dir_all(&input).unwrap();
        let config = RenderConfig::builder()
            .input_folder(&input)
            .output_file(dir.join("book.pdf"))
            .build()
            .unwrap();
        Session::with_config(dir.join("config.yaml"), config)
    }

    #[test]
    fn snapshots_are_isolated_from_edits() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let before = session.snapshot();
        let after = session.update(|cfg| cfg.classification = "SECRET".into());

        assert_eq!(before.classification, "");
        assert_eq!(after.classification, "SECRET");
        assert_eq!(session.snapshot().classification, "SECRET");
    }

    #[test]
    fn open_creates_and_save_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let session = Session::open(&path).unwrap();
        assert!(path.exists());

        session.update(|cfg| cfg.use_latex_fallback = true);
        session.save().unwrap();

        let reopened = Session::open(&path).unwrap();
        assert!(reopened.snapshot().use_latex_fallback);
    }

    #[test]
    fn reorder_refused_while_building() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        std::fs::write(dir.path().join("inputs/a.md"), "a").unwrap();

        let guard = session.builds().try_acquire(&dir.path().join("book.pdf")).unwrap();
        assert!(session.is_building());
        assert!(matches!(
            session.apply_order(&["a.md"]),
            Err(BriefingError::BuildInProgress { .. })
        ));
        assert!(matches!(session.undo(), Err(BriefingError::BuildInProgress { .. })));

        drop(guard);
        let report = session.apply_order(&["a.md"]).unwrap();
        assert_eq!(report.renamed(), 1);
        assert!(matches!(session.undo().unwrap(), UndoReport::Reverted(_)));
    }

    #[tokio::test]
    async fn build_refused_while_reordering() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        std::fs::write(dir.path().join("inputs/a.md"), "# A").unwrap();

        let renaming = session.exclusive_folder().unwrap();
        let err = session.build(BuildOptions::default()).await.unwrap_err();
        assert!(matches!(err, BriefingError::ReorderInProgress { .. }), "{err}");
        assert!(!session.is_building());
        assert!(!dir.path().join("book.pdf").exists());

        drop(renaming);
        assert!(session.exclusive_folder().is_ok());
    }

    #[test]
    fn reorder_refused_while_build_holds_folder() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        std::fs::write(dir.path().join("inputs/a.md"), "a").unwrap();

        let reading = session.folder_access.try_read().unwrap();
        assert!(matches!(
            session.apply_order(&["a.md"]),
            Err(BriefingError::BuildInProgress { .. })
        ));
        assert!(matches!(session.apply_staged(), Err(BriefingError::BuildInProgress { .. })));
        assert!(matches!(session.undo(), Err(BriefingError::BuildInProgress { .. })));
        assert_eq!(std::fs::read_dir(dir.path().join("inputs")).unwrap().count(), 1);
        assert!(dir.path().join("inputs/a.md").exists());

        drop(reading);
        assert_eq!(session.apply_order(&["a.md"]).unwrap().renamed(), 1);
    }

    #[test]
    fn changing_folder_retargets_reorder() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let other = dir.path().join("other");
        std::fs::create_dir(&other).unwrap();
        std::fs::write(other.join("z.md"), "z").unwrap();

        session.stage_order(&["x.md"]);
        session.update(|cfg| cfg.input_folder = other.clone());
        assert!(session.staged_order().is_none());
        assert_eq!(session.current_order().unwrap(), vec![other.join("z.md")]);
    }
}
