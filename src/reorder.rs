//! Apply a user-chosen order to disk by renaming files.
//!
//! Two phases: [`ReorderEngine::stage`] records a sequence without touching
//! the folder, [`ReorderEngine::apply`] performs the renames. File `i` of
//! the new order becomes `<i zero-padded>-<name without old prefix><ext>`.
//! The pad width is `max(digits(count - 1), MIN_PREFIX_DIGITS)`.
//!
//! Targets that would collide with a name already present in the folder get
//! `_1`, `_2`, … appended to the stem. A file's own current name never
//! counts as a collision, so applying the current order again renames
//! nothing. An existing file is never overwritten.
//!
//! The folder and every entry of an order are made absolute before they
//! are compared, so a bare name, a relative path and an absolute path to
//! the same file are the same entry.
//!
//! Prefixes are never narrower than two digits, even for a folder of fewer
//! than ten files: two files become `00-` and `01-`.
//!
//! A failed rename is recorded and the batch continues: the result is a
//! [`RenameReport`] of per-file outcomes, never a single error. The renames
//! that actually happened are remembered by absolute path so one
//! [`ReorderEngine::undo`] can put every file back.

use crate::error::{BriefingError, RenameError};
use crate::pipeline::discover;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Narrowest numeric prefix written by [`ReorderEngine::apply`].
pub const MIN_PREFIX_DIGITS: usize = 2;

static RE_STRIP_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+-").unwrap());

/// What happened to one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RenameStatus {
    Renamed,
    /// Already carried its target name.
    Unchanged,
    Failed(RenameError),
}

/// One entry of a [`RenameReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameOutcome {
    pub from: PathBuf,
    pub to: PathBuf,
    #[serde(flatten)]
    pub status: RenameStatus,
}

impl RenameOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, RenameStatus::Failed(_))
    }
}

/// Per-file outcomes of an apply or undo, in processing order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenameReport {
    pub outcomes: Vec<RenameOutcome>,
}

impl RenameReport {
    pub fn renamed(&self) -> usize {
        self.count(|s| matches!(s, RenameStatus::Renamed))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, RenameStatus::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, RenameStatus::Failed(_)))
    }

    /// `true` when no file failed.
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&RenameStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Result of [`ReorderEngine::undo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoReport {
    /// No apply since the last undo, or the last apply renamed nothing.
    NothingToUndo,
    Reverted(RenameReport),
}

/// Prefix width for a batch of `count` files.
pub fn prefix_width(count: usize) -> usize {
    count
        .saturating_sub(1)
        .to_string()
        .len()
        .max(MIN_PREFIX_DIGITS)
}

/// `{index:0width}-{stem without prefix}{suffix}{ext}`.
///
/// `ext` includes its leading dot, or is empty.
pub fn target_name(index: usize, width: usize, stem: &str, ext: &str, suffix: usize) -> String {
    let base = RE_STRIP_PREFIX.replace(stem, "");
    if suffix == 0 {
        format!("{index:0width$}-{base}{ext}")
    } else {
        format!("{index:0width$}-{base}_{suffix}{ext}")
    }
}

/// Renames the files of one folder into a chosen order.
#[derive(Debug)]
pub struct ReorderEngine {
    folder: PathBuf,
    staged: Option<Vec<PathBuf>>,
    /// `(before, after)` of every rename in the most recent apply.
    history: Option<Vec<(PathBuf, PathBuf)>>,
}

impl ReorderEngine {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: absolute(&folder.into()),
            staged: None,
            history: None,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Point the engine at another folder. Staged order and history are dropped.
    pub fn set_folder(&mut self, folder: impl Into<PathBuf>) {
        self.folder = absolute(&folder.into());
        self.staged = None;
        self.history = None;
    }

    /// The folder's Markdown files in their current build order.
    pub fn current_order(&self) -> Result<Vec<PathBuf>, BriefingError> {
        discover::scan(&self.folder)
    }

    /// Record `new_order` for a later [`ReorderEngine::apply_staged`].
    pub fn stage<P: AsRef<Path>>(&mut self, new_order: &[P]) {
        let order: Vec<PathBuf> = new_order.iter().map(|p| self.resolve(p.as_ref())).collect();
        debug!("Staged order of {} files", order.len());
        self.staged = Some(order);
    }

    pub fn staged(&self) -> Option<&[PathBuf]> {
        self.staged.as_deref()
    }

    pub fn clear_staged(&mut self) {
        self.staged = None;
    }

    /// `true` when an [`ReorderEngine::undo`] would rename something.
    pub fn can_undo(&self) -> bool {
        self.history.as_ref().is_some_and(|h| !h.is_empty())
    }

    /// Apply the staged order. An empty report when nothing is staged.
    pub fn apply_staged(&mut self) -> Result<RenameReport, BriefingError> {
        match self.staged.take() {
            Some(order) => self.apply(&order),
            None => {
                debug!("apply_staged: nothing staged");
                Ok(RenameReport::default())
            }
        }
    }

    /// Rename the files of `new_order` so they sort in that order.
    ///
    /// Entries may be bare file names (taken relative to the folder) or
    /// paths, relative to the working directory or absolute. Replaces the undo history with the renames performed here.
    ///
    /// # Errors
    /// [`BriefingError::InvalidFolder`] when the folder is missing. Per-file
    /// failures are reported in the returned [`RenameReport`] instead.
    pub fn apply<P: AsRef<Path>>(&mut self, new_order: &[P]) -> Result<RenameReport, BriefingError> {
        let mut occupied = self.occupied_names()?;
        let order: Vec<PathBuf> = new_order.iter().map(|p| self.resolve(p.as_ref())).collect();
        let width = prefix_width(order.len());

        let mut report = RenameReport::default();
        let mut performed = Vec::new();

        for (index, old) in order.into_iter().enumerate() {
            let Some(old_name) = old.file_name().map(OsString::from) else {
                report.outcomes.push(failed(old.clone(), old, "path has no file name"));
                continue;
            };
            let own_entry = old.parent() == Some(self.folder.as_path());
            if own_entry {
                occupied.remove(&old_name);
            }

            let (Some(stem), Some(ext)) = (
                old.file_stem().and_then(|s| s.to_str()),
                match old.extension() {
                    Some(e) => e.to_str().map(|e| format!(".{e}")),
                    None => Some(String::new()),
                },
            ) else {
                if own_entry {
                    occupied.insert(old_name);
                }
                report.outcomes.push(failed(old.clone(), old, "file name is not valid UTF-8"));
                continue;
            };

            let mut suffix = 0;
            let mut candidate = target_name(index, width, stem, &ext, suffix);
            while occupied.contains(&OsString::from(&candidate)) {
                suffix += 1;
                candidate = target_name(index, width, stem, &ext, suffix);
            }
            let new = self.folder.join(&candidate);

            if new == old {
                occupied.insert(old_name);
                report.outcomes.push(RenameOutcome {
                    from: old.clone(),
                    to: new,
                    status: RenameStatus::Unchanged,
                });
                continue;
            }

            match rename_no_clobber(&old, &new) {
                Ok(()) => {
                    info!("Renaming {} to {}", old.display(), new.display());
                    occupied.insert(OsString::from(&candidate));
                    performed.push((absolute(&old), absolute(&new)));
                    report.outcomes.push(RenameOutcome {
                        from: old,
                        to: new,
                        status: RenameStatus::Renamed,
                    });
                }
                Err(e) => {
                    warn!("Rename failed: {}", e);
                    if own_entry && old.exists() {
                        occupied.insert(old_name);
                    }
                    report.outcomes.push(RenameOutcome {
                        from: old,
                        to: new,
                        status: RenameStatus::Failed(e),
                    });
                }
            }
        }

        info!(
            "Applied order in {}: {} renamed, {} unchanged, {} failed",
            self.folder.display(),
            report.renamed(),
            report.unchanged(),
            report.failed()
        );
        self.history = (!performed.is_empty()).then_some(performed);
        Ok(report)
    }

    /// Reverse the most recent apply, newest rename first.
    ///
    /// One level only: a second call without an apply in between returns
    /// [`UndoReport::NothingToUndo`].
    pub fn undo(&mut self) -> UndoReport {
        let Some(history) = self.history.take() else {
            return UndoReport::NothingToUndo;
        };

        let mut report = RenameReport::default();
        for (before, after) in history.into_iter().rev() {
            match rename_no_clobber(&after, &before) {
                Ok(()) => {
                    info!("Restoring {} to {}", after.display(), before.display());
                    report.outcomes.push(RenameOutcome {
                        from: after,
                        to: before,
                        status: RenameStatus::Renamed,
                    });
                }
                Err(e) => {
                    warn!("Undo rename failed: {}", e);
                    report.outcomes.push(RenameOutcome {
                        from: after,
                        to: before,
                        status: RenameStatus::Failed(e),
                    });
                }
            }
        }
        UndoReport::Reverted(report)
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_relative() && p.components().count() == 1 {
            self.folder.join(p)
        } else {
            absolute(p)
        }
    }

    fn occupied_names(&self) -> Result<HashSet<OsString>, BriefingError> {
        let invalid = || BriefingError::InvalidFolder {
            path: self.folder.clone(),
        };
        if !self.folder.is_dir() {
            return Err(invalid());
        }
        let entries = std::fs::read_dir(&self.folder).map_err(|_| invalid())?;
        Ok(entries.flatten().map(|e| e.file_name()).collect())
    }
}

fn failed(from: PathBuf, to: PathBuf, detail: &str) -> RenameOutcome {
    RenameOutcome {
        status: RenameStatus::Failed(RenameError::Io {
            from: from.clone(),
            to: to.clone(),
            detail: detail.to_string(),
        }),
        from,
        to,
    }
}

fn absolute(p: &Path) -> PathBuf {
    std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf())
}

/// `fs::rename` that refuses to replace an existing target.
fn rename_no_clobber(from: &Path, to: &Path) -> Result<(), RenameError> {
    if !from.exists() {
        return Err(RenameError::SourceMissing {
            path: from.to_path_buf(),
        });
    }
    if to.exists() {
        return Err(RenameError::TargetExists {
            path: to.to_path_buf(),
        });
    }
    std::fs::rename(from, to)
        .map_err(|e| RenameError::from_io(from.to_path_buf(), to.to_path_buf(), &e))
}
