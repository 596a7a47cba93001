//! Random access over a log: seek, search, session jumps and forks.
//!
//! Seeks are best effort: any offset lands on some line of a non-empty
//! log. Line numbers are 1-based; position `0` means no line is selected
//! yet.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::atomic::atomic_file_with_backup;
use crate::codec::CompressionContext;
use crate::error::StoreError;
use crate::parser::{LineParser, RawLines};
use crate::warning::{Warning, WarningSink};
use crate::writer::NOW_PREFIX;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorLine {
    pub number: usize,
    pub offset: Option<f64>,
    pub compressed: bool,
    pub corrupt: bool,
    /// Decoded payload; the encoded text for corrupt lines.
    pub payload: String,
    /// The line exactly as stored, without its newline.
    #[serde(skip)]
    pub raw: String,
}

impl CursorLine {
    /// Whether this line opens a session.
    pub fn is_session_marker(&self) -> bool {
        self.offset.is_some() && !self.compressed && self.payload.starts_with(NOW_PREFIX)
    }
}

/// What [`LogCursor::find`] looks for in payloads.
#[derive(Debug, Clone)]
pub enum Needle {
    Text(String),
    Pattern(Regex),
}

impl Needle {
    fn matches(&self, payload: &str) -> bool {
        match self {
            Needle::Text(text) => payload.contains(text.as_str()),
            Needle::Pattern(regex) => regex.is_match(payload),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForkOutcome {
    pub path: PathBuf,
    /// Lines copied into the fork.
    pub lines: usize,
    /// Where a pre-existing file at the destination was moved.
    pub backup: Option<PathBuf>,
}

#[derive(Debug)]
pub struct LogCursor {
    path: PathBuf,
    lines: Vec<CursorLine>,
    position: usize,
}

impl LogCursor {
    pub fn open(path: &Path, sink: &mut dyn WarningSink) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|e| StoreError::file(path, e))?;
        Self::from_reader(path, BufReader::new(file), sink)
    }

    /// Load every complete line of `reader`. `path` is what forks are
    /// checked against.
    pub fn from_reader<R: BufRead>(
        path: &Path,
        reader: R,
        sink: &mut dyn WarningSink,
    ) -> Result<Self, StoreError> {
        let mut codec = CompressionContext::default();
        let mut parser = LineParser::new(&mut codec);
        let mut lines = Vec::new();

        for raw in RawLines::new(reader) {
            let raw = raw.map_err(|e| StoreError::file(path, e))?;
            if !raw.terminated {
                sink.warn(Warning::Unterminated { line: raw.number });
                break;
            }
            let parsed = parser.parse(raw.number, &raw.text, sink);
            lines.push(CursorLine {
                number: raw.number,
                offset: parsed.offset,
                compressed: parsed.compressed,
                corrupt: parsed.corrupt,
                payload: parsed.payload,
                raw: raw.text,
            });
        }
        parser.finish(sink);

        Ok(Self {
            path: path.to_path_buf(),
            lines,
            position: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<&CursorLine> {
        self.line(self.position)
    }

    pub fn line(&self, number: usize) -> Option<&CursorLine> {
        number.checked_sub(1).and_then(|i| self.lines.get(i))
    }

    /// Absolute jump. `0` is the last line, negative offsets count back
    /// from it, and anything past the end clamps to the last line.
    pub fn seek(&mut self, offset: i64) -> Option<&CursorLine> {
        let len = self.lines.len();
        if len == 0 {
            return None;
        }
        let back = offset.unsigned_abs().min(len as u64) as usize;
        self.position = match offset {
            0 => len,
            o if o > 0 => back,
            _ => (len - back).max(1),
        };
        self.current()
    }

    /// Relative jump from the current position, clamped to the file.
    pub fn step(&mut self, delta: i64) -> Option<&CursorLine> {
        let len = self.lines.len();
        if len == 0 {
            return None;
        }
        let target = (self.position as i64).saturating_add(delta);
        self.position = target.clamp(1, len as i64) as usize;
        self.current()
    }

    /// Move to the next line after the current one whose payload matches.
    /// The position is unchanged when nothing matches.
    pub fn find(&mut self, needle: &Needle) -> Option<&CursorLine> {
        let found = self.lines[self.position.min(self.lines.len())..]
            .iter()
            .find(|line| line.offset.is_some() && needle.matches(&line.payload))
            .map(|line| line.number)?;
        self.position = found;
        self.current()
    }

    /// Jump to a session's `now:` marker. Sessions are numbered from 1;
    /// `0` is the last session and negative values count back from it.
    pub fn session(&mut self, index: i64) -> Option<&CursorLine> {
        let markers: Vec<usize> = self
            .lines
            .iter()
            .filter(|line| line.is_session_marker())
            .map(|line| line.number)
            .collect();
        let count = markers.len();
        if count == 0 {
            return None;
        }
        let back = index.unsigned_abs().min(count as u64) as usize;
        let nth = match index {
            0 => count,
            i if i > 0 => back,
            _ => (count - back).max(1),
        };
        self.position = markers[nth - 1];
        self.current()
    }

    /// Copy lines `1..=position` into `dest`. The source is never touched,
    /// and an existing `dest` is moved aside rather than overwritten.
    pub fn fork(&self, dest: &Path) -> Result<ForkOutcome, StoreError> {
        if same_file(&self.path, dest) {
            return Err(StoreError::file(
                dest,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "cannot fork a log onto itself",
                ),
            ));
        }

        let kept = &self.lines[..self.position.min(self.lines.len())];
        let ((), backup) = atomic_file_with_backup(dest, |out: &mut dyn Write| {
            for line in kept {
                out.write_all(line.raw.as_bytes())?;
                out.write_all(b"\n")?;
            }
            Ok::<(), std::io::Error>(())
        })
        .map_err(|e| StoreError::file(dest, e))?;

        info!(
            from = %self.path.display(),
            to = %dest.display(),
            lines = kept.len(),
            "Forked log"
        );
        Ok(ForkOutcome {
            path: dest.to_path_buf(),
            lines: kept.len(),
            backup,
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const THREE_SESSIONS: &str = "T0 now: 2026-01-20T10:00:00+00:00\n\
        T1 guess: crane\n\
        T2 result: crane => -y--g\n\
        T0 now: 2026-01-20T11:00:00+00:00\n\
        T4 guess: slate\n\
        T0 now: 2026-01-20T12:00:00+00:00\n\
        T3 guess: plait\n\
        T5 result: plait => ggggg\n";

    fn cursor(text: &str) -> LogCursor {
        let mut warnings: Vec<Warning> = Vec::new();
        LogCursor::from_reader(Path::new("mem.log"), text.as_bytes(), &mut warnings).unwrap()
    }

    #[test]
    fn test_seek_zero_is_last_line() {
        let mut c = cursor(THREE_SESSIONS);
        assert_eq!(c.seek(0).unwrap().number, 8);
    }

    #[test]
    fn test_seek_clamps_past_end() {
        let mut c = cursor(THREE_SESSIONS);
        assert_eq!(c.seek(58).unwrap().number, 8);
        assert_eq!(c.seek(3).unwrap().payload, "result: crane => -y--g");
    }

    #[test]
    fn test_seek_negative_counts_back() {
        let mut c = cursor(THREE_SESSIONS);
        assert_eq!(c.seek(-1).unwrap().number, 7);
        assert_eq!(c.seek(-100).unwrap().number, 1);
    }

    #[test]
    fn test_seek_empty_log() {
        let mut c = cursor("");
        assert!(c.seek(0).is_none());
        assert!(c.step(1).is_none());
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_step_is_relative_and_clamped() {
        let mut c = cursor(THREE_SESSIONS);
        c.seek(2);
        assert_eq!(c.step(3).unwrap().number, 5);
        assert_eq!(c.step(-10).unwrap().number, 1);
        assert_eq!(c.step(100).unwrap().number, 8);
    }

    #[test]
    fn test_step_saturates_on_huge_deltas() {
        let mut c = cursor(THREE_SESSIONS);
        c.seek(0);
        assert_eq!(c.step(i64::MAX).unwrap().number, 8);
        assert_eq!(c.step(i64::MIN).unwrap().number, 1);
        assert_eq!(c.step(i64::MAX).unwrap().number, 8);
    }

    #[test]
    fn test_find_searches_forward_from_cursor() {
        let mut c = cursor(THREE_SESSIONS);
        let needle = Needle::Text("guess:".to_string());

        assert_eq!(c.find(&needle).unwrap().number, 2);
        assert_eq!(c.find(&needle).unwrap().number, 5);
        assert_eq!(c.find(&needle).unwrap().number, 7);
        assert!(c.find(&needle).is_none());
        assert_eq!(c.position(), 7);
    }

    #[test]
    fn test_find_by_pattern() {
        let mut c = cursor(THREE_SESSIONS);
        let needle = Needle::Pattern(Regex::new(r"=> g{5}$").unwrap());
        assert_eq!(c.find(&needle).unwrap().number, 8);
    }

    #[test]
    fn test_session_jumps() {
        let mut c = cursor(THREE_SESSIONS);
        assert_eq!(c.session(1).unwrap().number, 1);
        assert_eq!(c.session(2).unwrap().number, 4);
        assert_eq!(c.session(0).unwrap().number, 6);
        assert_eq!(c.session(-1).unwrap().number, 4);
        assert_eq!(c.session(9).unwrap().number, 6);
    }

    #[test]
    fn test_compressed_marker_is_not_a_session() {
        let mut writer = CompressionContext::default();
        let encoded = writer.encode(b"now: 2026-01-21T00:00:00+00:00").unwrap();
        let text = format!("T0 now: 2026-01-20T10:00:00+00:00\nT1Z {encoded}\n");
        let mut c = cursor(&text);

        assert_eq!(c.session(0).unwrap().number, 1);
        assert!(c.line(2).unwrap().compressed);
        assert!(!c.line(2).unwrap().is_session_marker());
    }

    #[test]
    fn test_unterminated_tail_is_not_loaded() {
        let mut warnings: Vec<Warning> = Vec::new();
        let c = LogCursor::from_reader(
            Path::new("mem.log"),
            &b"T0 now: 2026-01-20T10:00:00+00:00\nT1 gue"[..],
            &mut warnings,
        )
        .unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(warnings, vec![Warning::Unterminated { line: 2 }]);
    }

    #[test]
    fn test_fork_copies_prefix_and_leaves_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.log");
        let dest = dir.path().join("b.log");
        fs::write(&source, THREE_SESSIONS).unwrap();

        let mut warnings: Vec<Warning> = Vec::new();
        let mut c = LogCursor::open(&source, &mut warnings).unwrap();
        c.seek(5);
        let outcome = c.fork(&dest).unwrap();

        assert_eq!(outcome.lines, 5);
        assert_eq!(outcome.backup, None);
        assert_eq!(fs::read_to_string(&source).unwrap(), THREE_SESSIONS);
        let forked = fs::read_to_string(&dest).unwrap();
        assert_eq!(forked.lines().count(), 5);
        assert!(forked.ends_with("T4 guess: slate\n"));
    }

    #[test]
    fn test_fork_backs_up_existing_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.log");
        let dest = dir.path().join("b.log");
        fs::write(&source, THREE_SESSIONS).unwrap();
        fs::write(&dest, "T0 someone else's log\n").unwrap();

        let mut c = LogCursor::open(&source, &mut Vec::<Warning>::new()).unwrap();
        c.seek(1);
        let outcome = c.fork(&dest).unwrap();

        let backup = outcome.backup.unwrap();
        assert_eq!(
            fs::read_to_string(backup).unwrap(),
            "T0 someone else's log\n"
        );
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            "T0 now: 2026-01-20T10:00:00+00:00\n"
        );
    }

    #[test]
    fn test_fork_onto_itself_is_refused() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.log");
        fs::write(&source, THREE_SESSIONS).unwrap();

        let mut c = LogCursor::open(&source, &mut Vec::<Warning>::new()).unwrap();
        c.seek(2);

        assert!(c.fork(&source).is_err());
        assert_eq!(fs::read_to_string(&source).unwrap(), THREE_SESSIONS);
    }
}
