//! Whole-file writes that are never visible half-done.
//!
//! New content goes to an exclusively created sibling temp file; a rename
//! over the target is the only step that changes what readers see. If the
//! caller's closure fails (or panics) the temp file is removed and the
//! target is untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Write `path` atomically with whatever `write` produces.
pub fn atomic_file<T, E, F>(path: &Path, write: F) -> Result<T, E>
where
    F: FnOnce(&mut dyn Write) -> Result<T, E>,
    E: From<io::Error>,
{
    replace(path, false, write).map(|(value, _)| value)
}

/// Like [`atomic_file`], but an existing file at `path` is first moved aside
/// with [`backup_old`] instead of being replaced. Returns the backup path,
/// if one was made.
pub fn atomic_file_with_backup<T, E, F>(path: &Path, write: F) -> Result<(T, Option<PathBuf>), E>
where
    F: FnOnce(&mut dyn Write) -> Result<T, E>,
    E: From<io::Error>,
{
    replace(path, true, write)
}

/// Stream-transform the current content of `path` into new content. A
/// missing file reads as empty.
pub fn atomic_rewrite<T, E, F>(path: &Path, rewrite: F) -> Result<T, E>
where
    F: FnOnce(&mut dyn BufRead, &mut dyn Write) -> Result<T, E>,
    E: From<io::Error>,
{
    let mut source: Box<dyn BufRead> = match File::open(path) {
        Ok(file) => Box::new(BufReader::new(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Box::new(io::empty()),
        Err(e) => return Err(e.into()),
    };
    atomic_file(path, |out| rewrite(&mut *source, out))
}

/// Move an existing `path` aside to `<path>.old_<mtime>`.
///
/// Refuses with `AlreadyExists` if that backup name is taken, rather than
/// destroying an older generation.
pub fn backup_old(path: &Path) -> io::Result<Option<PathBuf>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mtime: DateTime<Utc> = meta.modified()?.into();
    let backup = sibling(path, &format!(".old_{}", mtime.format("%Y%m%dT%H%M%SZ")))?;

    // A hard link cannot clobber an existing name, unlike rename.
    match fs::hard_link(path, &backup) {
        Ok(()) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
        Err(_) => {
            if backup.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("backup {} already exists", backup.display()),
                ));
            }
            fs::rename(path, &backup)?;
        }
    }
    debug!(path = %path.display(), backup = %backup.display(), "Moved old file aside");
    Ok(Some(backup))
}

/// Create `path` exclusively, moving any existing file aside first.
pub fn create_exclusive(path: &Path) -> io::Result<(File, Option<PathBuf>)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let backup = backup_old(path)?;
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    Ok((file, backup))
}

fn replace<T, E, F>(path: &Path, backup: bool, write: F) -> Result<(T, Option<PathBuf>), E>
where
    F: FnOnce(&mut dyn Write) -> Result<T, E>,
    E: From<io::Error>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_string_lossy()
        .into_owned();

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".new")
        .tempfile_in(dir)?;

    let value = {
        let mut out = BufWriter::new(temp.as_file_mut());
        let value = write(&mut out)?;
        out.flush()?;
        value
    };
    temp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp.path(), meta.permissions())?;
    }

    let backup = if backup { backup_old(path)? } else { None };
    temp.persist(path).map_err(|e| E::from(e.error))?;
    Ok((value, backup))
}

fn sibling(path: &Path, suffix: &str) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut name = name.to_os_string();
    name.push(suffix);
    Ok(path.with_file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_atomic_file_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");

        atomic_file(&path, |out| out.write_all(b"first\n")).unwrap();
        atomic_file(&path, |out| out.write_all(b"second\n")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert_eq!(dir_names(dir.path()), vec!["a.log"]);
    }

    #[test]
    fn test_atomic_file_failure_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "original\n").unwrap();

        let result: io::Result<()> = atomic_file(&path, |out| {
            out.write_all(b"half of the new cont")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "original\n");
        assert_eq!(dir_names(dir.path()), vec!["a.log"]);
    }

    #[test]
    fn test_atomic_rewrite_transforms_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "T0 one\nT1 two\n").unwrap();

        let kept: io::Result<usize> = atomic_rewrite(&path, |input, out| {
            let mut kept = 0;
            for line in input.lines() {
                let line = line?;
                if line.contains("one") {
                    writeln!(out, "{line}")?;
                    kept += 1;
                }
            }
            Ok(kept)
        });

        assert_eq!(kept.unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "T0 one\n");
    }

    #[test]
    fn test_atomic_rewrite_failure_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "T0 one\nT1 two\n").unwrap();

        let result: io::Result<()> = atomic_rewrite(&path, |input, out| {
            let mut first = String::new();
            input.read_line(&mut first)?;
            out.write_all(first.as_bytes())?;
            out.write_all(b"T1 tw")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "T0 one\nT1 two\n");
        assert_eq!(dir_names(dir.path()), vec!["a.log"]);
    }

    #[test]
    fn test_atomic_rewrite_of_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.log");

        let result: io::Result<()> = atomic_rewrite(&path, |input, out| {
            let mut existing = String::new();
            input.read_to_string(&mut existing)?;
            assert!(existing.is_empty());
            out.write_all(b"T0 fresh\n")
        });

        result.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "T0 fresh\n");
    }

    #[test]
    fn test_backup_old_moves_file_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "old\n").unwrap();

        let backup = backup_old(&path).unwrap().unwrap();

        assert!(!path.exists());
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old\n");
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("a.log.old_"), "{name}");
    }

    #[test]
    fn test_backup_old_of_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        assert_eq!(backup_old(&dir.path().join("nothing")).unwrap(), None);
    }

    #[test]
    fn test_backup_old_refuses_to_clobber_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "gen 1\n").unwrap();
        let first = backup_old(&path).unwrap().unwrap();

        // Same mtime second, so the same backup name.
        fs::write(&path, "gen 2\n").unwrap();
        let mtime = fs::metadata(&first).unwrap().modified().unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let err = backup_old(&path).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).unwrap(), "gen 2\n");
        assert_eq!(fs::read_to_string(&first).unwrap(), "gen 1\n");
    }

    #[test]
    fn test_create_exclusive_backs_up_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("a.log");
        let (_file, backup) = create_exclusive(&path).unwrap();
        assert!(backup.is_none());

        let (_file, backup) = create_exclusive(&path).unwrap();
        assert!(backup.unwrap().exists());
        assert_eq!(fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_atomic_file_with_backup_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fork.log");
        fs::write(&path, "previous\n").unwrap();

        let ((), backup) =
            atomic_file_with_backup(&path, |out| out.write_all(b"next\n")).unwrap();

        let backup = backup.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "next\n");
        assert_eq!(fs::read_to_string(backup).unwrap(), "previous\n");
    }

    #[test]
    fn test_read_through_backup_after_failed_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "keep\n").unwrap();

        let result: Result<((), Option<PathBuf>), io::Error> =
            atomic_file_with_backup(&path, |_| Err(io::Error::new(io::ErrorKind::Other, "no")));

        assert!(result.is_err());
        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "keep\n");
        assert_eq!(dir_names(dir.path()), vec!["a.log"]);
    }
}
