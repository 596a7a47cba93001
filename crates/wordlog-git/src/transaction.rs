use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::archive::{Archive, ArchiveError};

/// A staged, all-or-nothing unit of change against an [`Archive`].
///
/// Dropping a transaction that still has staged paths and was never
/// committed restores every staged path to its last committed content.
pub struct Transaction<'a, A: Archive + ?Sized> {
    archive: &'a mut A,
    message: String,
    staged_add: BTreeSet<PathBuf>,
    staged_remove: BTreeSet<PathBuf>,
    finished: bool,
}

impl<'a, A: Archive + ?Sized> Transaction<'a, A> {
    pub fn begin(archive: &'a mut A, message: impl Into<String>) -> Self {
        Self {
            archive,
            message: message.into(),
            staged_add: BTreeSet::new(),
            staged_remove: BTreeSet::new(),
            finished: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_empty(&self) -> bool {
        self.staged_add.is_empty() && self.staged_remove.is_empty()
    }

    /// Every staged path, additions first.
    pub fn staged(&self) -> impl Iterator<Item = &Path> {
        self.staged_add
            .iter()
            .chain(self.staged_remove.iter())
            .map(PathBuf::as_path)
    }

    /// Run `change` against `path`, then stage the result as an addition.
    ///
    /// If `change` or the staging itself fails, `path` is restored from the
    /// archive before the error is returned.
    pub fn will_add<T, E, F>(&mut self, path: impl AsRef<Path>, change: F) -> Result<T, E>
    where
        F: FnOnce(&Path) -> Result<T, E>,
        E: From<ArchiveError>,
    {
        let path = path.as_ref();
        match change(path) {
            Ok(value) => {
                if let Err(e) = self.archive.stage_add(path) {
                    self.restore_after_failure(path);
                    return Err(e.into());
                }
                self.staged_add.insert(path.to_path_buf());
                Ok(value)
            }
            Err(err) => {
                self.restore_after_failure(path);
                Err(err)
            }
        }
    }

    /// Like [`Transaction::will_add`], staging a removal instead.
    pub fn will_rm<T, E, F>(&mut self, path: impl AsRef<Path>, change: F) -> Result<T, E>
    where
        F: FnOnce(&Path) -> Result<T, E>,
        E: From<ArchiveError>,
    {
        let path = path.as_ref();
        match change(path) {
            Ok(value) => {
                if let Err(e) = self.archive.stage_remove(path) {
                    self.restore_after_failure(path);
                    return Err(e.into());
                }
                self.staged_remove.insert(path.to_path_buf());
                Ok(value)
            }
            Err(err) => {
                self.restore_after_failure(path);
                Err(err)
            }
        }
    }

    /// Commit all staged paths as one unit. Returns `false` without touching
    /// the archive when nothing was staged.
    pub fn commit(mut self) -> Result<bool, ArchiveError> {
        if self.is_empty() {
            self.finished = true;
            return Ok(false);
        }

        // On failure `finished` stays false and Drop rolls the staged paths back.
        self.archive.commit(&self.message)?;
        self.finished = true;
        debug!(
            message = %self.message,
            added = self.staged_add.len(),
            removed = self.staged_remove.len(),
            "Transaction committed"
        );
        Ok(true)
    }

    /// Restore every staged path. All paths are attempted; the first failure
    /// is returned.
    pub fn rollback(mut self) -> Result<(), ArchiveError> {
        self.finished = true;
        self.restore_staged()
    }

    fn restore_staged(&mut self) -> Result<(), ArchiveError> {
        let staged: Vec<PathBuf> = self
            .staged_add
            .iter()
            .chain(self.staged_remove.iter())
            .cloned()
            .collect();

        let mut first_error = None;
        for path in staged {
            if let Err(e) = self.archive.restore(&path) {
                error!(path = %path.display(), error = %e, "Failed to restore staged path");
                first_error.get_or_insert(e);
            }
        }
        self.staged_add.clear();
        self.staged_remove.clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn restore_after_failure(&mut self, path: &Path) {
        if let Err(e) = self.archive.restore(path) {
            error!(path = %path.display(), error = %e, "Failed to restore path after failed change");
        }
    }
}

impl<A: Archive + ?Sized> Drop for Transaction<'_, A> {
    fn drop(&mut self) {
        if self.finished || self.is_empty() {
            return;
        }
        warn!(message = %self.message, "Rolling back unfinished transaction");
        let _ = self.restore_staged();
    }
}

/// Run `body` inside a transaction: commit when it succeeds with staged
/// changes, roll back every staged path when it fails. The body's error is
/// always the one returned.
pub fn transact<A, T, E, F>(archive: &mut A, message: &str, body: F) -> Result<T, E>
where
    A: Archive + ?Sized,
    F: FnOnce(&mut Transaction<'_, A>) -> Result<T, E>,
    E: From<ArchiveError>,
{
    let mut txn = Transaction::begin(archive, message);
    match body(&mut txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback() {
                warn!(error = %rollback_err, "Rollback incomplete");
            }
            Err(err)
        }
    }
}
