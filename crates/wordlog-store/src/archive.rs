//! Moving a finished log into the permanent archive.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use wordlog_git::{transact, Archive};

use crate::atomic::atomic_file;
use crate::error::StoreError;
use crate::stored::StoredLog;
use crate::warning::WarningSink;

/// Commit `log` into the archive at `root` as `<site>/<puzzle_id>`.
///
/// The log is closed and replayed first; it must have both identity
/// fields. The working copy is removed only after the commit succeeds,
/// and `log` is then rebound to the archived path.
pub fn archive_log<A>(
    log: &mut StoredLog,
    archive: &mut A,
    root: &Path,
    sink: &mut dyn WarningSink,
) -> Result<PathBuf, StoreError>
where
    A: Archive + ?Sized,
{
    log.close()?;
    log.load(sink)?;

    let source = log.log_file().to_path_buf();
    let site = log.site().ok_or_else(|| StoreError::MissingField {
        path: source.clone(),
        field: "site",
    })?;
    let puzzle_id = log.puzzle_id().ok_or_else(|| StoreError::MissingField {
        path: source.clone(),
        field: "puzzle_id",
    })?;

    let dest = archive_path(root, site, puzzle_id);
    let message = format!("{} {}", site, puzzle_id);
    if same_path(&source, &dest) {
        debug!(path = %dest.display(), "Log already lives in the archive");
    }

    transact(archive, &message, |txn| {
        txn.will_add(&dest, |dest| place(&source, dest))
    })?;

    if !same_path(&source, &dest) {
        fs::remove_file(&source).map_err(|e| StoreError::file(&source, e))?;
    }
    log.rebind(dest.clone());
    info!(from = %source.display(), to = %dest.display(), "Archived log");
    Ok(dest)
}

impl StoredLog {
    /// See [`archive_log`].
    pub fn archive<A>(
        &mut self,
        archive: &mut A,
        root: &Path,
        sink: &mut dyn WarningSink,
    ) -> Result<PathBuf, StoreError>
    where
        A: Archive + ?Sized,
    {
        archive_log(self, archive, root, sink)
    }
}

/// Where the log for `site`/`puzzle_id` lives under `root`.
pub fn archive_path(root: &Path, site: &str, puzzle_id: &str) -> PathBuf {
    root.join(site_key(site)).join(sanitize(puzzle_id))
}

/// Directory name for a site: scheme, `www.`, query and trailing slashes
/// dropped, remaining separators flattened.
pub fn site_key(site: &str) -> String {
    let site = site.trim();
    let site = site
        .split_once("://")
        .map_or(site, |(_, rest)| rest);
    let site = site.split(['?', '#']).next().unwrap_or(site);
    let site = site.strip_prefix("www.").unwrap_or(site);
    sanitize(site.trim_end_matches('/'))
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Put `source` at `dest`: a hard link when `dest` is new, otherwise an
/// atomic copy over the older archived version.
fn place(source: &Path, dest: &Path) -> Result<(), StoreError> {
    if same_path(source, dest) {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::file(parent, e))?;
    }
    if !dest.exists() && fs::hard_link(source, dest).is_ok() {
        return Ok(());
    }
    let content = fs::read(source).map_err(|e| StoreError::file(source, e))?;
    atomic_file(dest, |out: &mut dyn Write| out.write_all(&content))
        .map_err(|e: io::Error| StoreError::file(dest, e))
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
