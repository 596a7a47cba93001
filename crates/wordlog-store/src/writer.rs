use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::codec::CompressionContext;
use crate::error::StoreError;
use crate::parser::format_line;

/// Reserved payload prefix that opens a session. Always written plain.
pub const NOW_PREFIX: &str = "now:";

/// Decides which payloads are written compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressPolicy {
    /// Payloads at least this many bytes long are compressed. `0` disables
    /// size-based compression.
    pub threshold: usize,
}

impl Default for CompressPolicy {
    fn default() -> Self {
        Self { threshold: 256 }
    }
}

impl CompressPolicy {
    pub fn never() -> Self {
        Self { threshold: 0 }
    }

    /// Multi-line payloads and payloads that would read as a session marker
    /// are compressed regardless of size, since a plain line can carry
    /// neither.
    pub fn should_compress(&self, message: &str) -> bool {
        message.contains(['\n', '\r'])
            || message.starts_with(NOW_PREFIX)
            || (self.threshold > 0 && message.len() >= self.threshold)
    }
}

/// An open append session on one log file.
///
/// Every line goes out in a single write, so an interrupt between records
/// never leaves a partial line behind.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    file: File,
    started: Instant,
    started_at: DateTime<FixedOffset>,
    last_offset: f64,
    policy: CompressPolicy,
}

impl SessionLog {
    /// Open `path` for append and write the session's `now:` marker.
    ///
    /// A partial final line left by a crash is cut off first so the new
    /// session does not glue onto it.
    pub fn open(
        path: &Path,
        started_at: DateTime<FixedOffset>,
        policy: CompressPolicy,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::file(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::file(path, e))?;
        truncate_partial_tail(&mut file).map_err(|e| StoreError::file(path, e))?;

        let mut log = Self {
            path: path.to_path_buf(),
            file,
            started: Instant::now(),
            started_at,
            last_offset: 0.0,
            policy,
        };
        let marker = format!("{} {}", NOW_PREFIX, started_at.to_rfc3339());
        log.write_line(&format_line(0.0, false, &marker))?;
        debug!(path = %log.path.display(), "Opened session");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started_at(&self) -> DateTime<FixedOffset> {
        self.started_at
    }

    /// Offset of the most recently written line.
    pub fn last_offset(&self) -> f64 {
        self.last_offset
    }

    /// Append `message`, compressing it when the policy says so. Returns the
    /// offset it was stamped with.
    pub fn record(
        &mut self,
        message: &str,
        codec: &mut CompressionContext,
    ) -> Result<f64, StoreError> {
        let compress = self.policy.should_compress(message);
        self.record_with(message, compress, codec)
    }

    /// Append `message` with an explicit compression choice. Messages that
    /// cannot be written plain are compressed anyway.
    pub fn record_with(
        &mut self,
        message: &str,
        compress: bool,
        codec: &mut CompressionContext,
    ) -> Result<f64, StoreError> {
        let offset = self.next_offset();
        let compress = compress
            || message.contains(['\n', '\r'])
            || message.starts_with(NOW_PREFIX);
        let line = if compress {
            format_line(offset, true, &codec.encode(message.as_bytes())?)
        } else {
            format_line(offset, false, message)
        };
        self.write_line(&line)?;
        Ok(offset)
    }

    /// Flush to disk and return the session's elapsed time.
    pub fn close(self) -> Result<f64, StoreError> {
        self.file
            .sync_all()
            .map_err(|e| StoreError::file(&self.path, e))?;
        debug!(path = %self.path.display(), elapsed = self.last_offset, "Closed session");
        Ok(self.last_offset)
    }

    fn next_offset(&mut self) -> f64 {
        let offset = self.started.elapsed().as_secs_f64().max(self.last_offset);
        self.last_offset = offset;
        offset
    }

    fn write_line(&mut self, line: &str) -> Result<(), StoreError> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.file
            .write_all(buf.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|e| StoreError::file(&self.path, e))
    }
}

/// Cut the file back to its last newline if it ends mid-line.
fn truncate_partial_tail(file: &mut File) -> std::io::Result<()> {
    const CHUNK: u64 = 4096;

    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut end = len;
    let mut buf = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            let keep = start + pos as u64 + 1;
            warn!(dropped = len - keep, "Dropping partial final line");
            return file.set_len(keep);
        }
        end = start;
    }

    warn!(dropped = len, "Dropping partial only line");
    file.set_len(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0).unwrap().timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_policy() {
        let policy = CompressPolicy { threshold: 10 };
        assert!(!policy.should_compress("short"));
        assert!(policy.should_compress("exactly 10"));
        assert!(policy.should_compress("two\nlines"));
        assert!(policy.should_compress("now: sneaky"));
        assert!(!CompressPolicy::never().should_compress(&"x".repeat(10_000)));
    }

    #[test]
    fn test_open_writes_plain_now_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");

        let log = SessionLog::open(&path, at(1_768_903_200), CompressPolicy::default()).unwrap();
        log.close().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "T0 now: 2026-01-20T10:00:00+00:00\n"
        );
    }

    #[test]
    fn test_record_appends_terminated_lines_with_monotonic_offsets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let mut codec = CompressionContext::default();

        let mut log = SessionLog::open(&path, at(0), CompressPolicy::never()).unwrap();
        let a = log.record("guess: crane", &mut codec).unwrap();
        let b = log.record("guess: slate", &mut codec).unwrap();
        log.close().unwrap();

        assert!(b >= a);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(" guess: crane"));
        assert!(lines[2].ends_with(" guess: slate"));
    }

    #[test]
    fn test_record_compresses_multiline_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let mut codec = CompressionContext::default();

        let mut log = SessionLog::open(&path, at(0), CompressPolicy::never()).unwrap();
        log.record("board:\n-y--g\n--g-y", &mut codec).unwrap();
        log.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let last = content.lines().last().unwrap();
        let token = last.split(' ').next().unwrap();
        assert!(token.ends_with('Z'));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_open_truncates_partial_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "T0 now: 2026-01-20T10:00:00+00:00\nT1.5 guess: cr").unwrap();

        let log = SessionLog::open(&path, at(0), CompressPolicy::default()).unwrap();
        log.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "T0 now: 2026-01-20T10:00:00+00:00\nT0 now: 1970-01-01T00:00:00+00:00\n"
        );
    }
}
