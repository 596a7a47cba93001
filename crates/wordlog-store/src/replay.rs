use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::debug;

use crate::codec::CompressionContext;
use crate::error::StoreError;
use crate::parser::{LineParser, RawLines};
use crate::warning::{Warning, WarningSink};
use crate::writer::NOW_PREFIX;

pub const SITE_PREFIX: &str = "site:";
pub const PUZZLE_ID_PREFIX: &str = "puzzle_id:";

/// One contiguous run of the program, opened by a `now:` marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub start: DateTime<FixedOffset>,
    /// Seconds: the last offset seen before the session ended.
    pub elapsed: f64,
}

/// A solver-defined line handed back by replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// 1-based physical line number.
    pub line: usize,
    /// Index into [`Snapshot::sessions`]; `None` for lines before any marker.
    pub session: Option<usize>,
    pub offset: f64,
    pub compressed: bool,
    pub payload: String,
}

/// State reconstructed from one pass over a log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Start of the very first session.
    pub start: Option<DateTime<FixedOffset>>,
    pub site: Option<String>,
    pub puzzle_id: Option<String>,
    pub sessions: Vec<Session>,
    pub entries: Vec<LogEntry>,
    /// Physical lines read, including skipped ones.
    pub lines: usize,
    pub corrupt_lines: usize,
}

impl Snapshot {
    /// Total time spent across sessions; never the wall-clock span.
    pub fn total_elapsed(&self) -> f64 {
        self.sessions.iter().map(|s| s.elapsed).sum()
    }

    /// `(offset, payload)` pairs in file order.
    pub fn events(&self) -> impl Iterator<Item = (f64, &str)> {
        self.entries.iter().map(|e| (e.offset, e.payload.as_str()))
    }
}

/// Replay the log at `path`.
///
/// `codec` is reset first and left primed with everything replayed, ready
/// for a writer to append to the same file.
pub fn replay(
    path: &Path,
    codec: &mut CompressionContext,
    sink: &mut dyn WarningSink,
) -> Result<Snapshot, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::file(path, e))?;
    let snapshot =
        replay_reader(BufReader::new(file), codec, sink).map_err(|e| StoreError::file(path, e))?;
    debug!(
        path = %path.display(),
        lines = snapshot.lines,
        sessions = snapshot.sessions.len(),
        "Replayed log"
    );
    Ok(snapshot)
}

/// Replay from any reader. Only I/O failures are errors; content problems
/// go to `sink`.
pub fn replay_reader<R: BufRead>(
    reader: R,
    codec: &mut CompressionContext,
    sink: &mut dyn WarningSink,
) -> std::io::Result<Snapshot> {
    codec.reset();
    let mut parser = LineParser::new(codec).priming(true);
    let mut snapshot = Snapshot::default();
    let mut current: Option<DateTime<FixedOffset>> = None;
    let mut last_offset = 0.0;

    for raw in RawLines::new(reader) {
        let raw = raw?;
        snapshot.lines = raw.number;
        if !raw.terminated {
            sink.warn(Warning::Unterminated { line: raw.number });
            break;
        }

        let parsed = parser.parse(raw.number, &raw.text, sink);
        let Some(offset) = parsed.offset else {
            continue;
        };
        if parsed.corrupt {
            snapshot.corrupt_lines += 1;
            continue;
        }

        // Only a plain marker delimits sessions.
        if !parsed.compressed {
            if let Some(stamp) = parsed.payload.strip_prefix(NOW_PREFIX) {
                match DateTime::parse_from_rfc3339(stamp.trim()) {
                    Ok(start) => {
                        if let Some(prior) = current.replace(start) {
                            snapshot.sessions.push(Session {
                                start: prior,
                                elapsed: last_offset,
                            });
                        }
                        snapshot.start.get_or_insert(start);
                        last_offset = offset;
                    }
                    Err(e) => sink.warn(Warning::BadEvent {
                        line: raw.number,
                        payload: parsed.payload.clone(),
                        reason: e.to_string(),
                    }),
                }
                continue;
            }
        }

        let identity = if let Some(value) = parsed.payload.strip_prefix(SITE_PREFIX) {
            Some((&mut snapshot.site, value))
        } else if let Some(value) = parsed.payload.strip_prefix(PUZZLE_ID_PREFIX) {
            Some((&mut snapshot.puzzle_id, value))
        } else {
            None
        };
        if let Some((field, value)) = identity {
            let value = value.trim();
            if value.is_empty() {
                sink.warn(Warning::BadEvent {
                    line: raw.number,
                    payload: parsed.payload.clone(),
                    reason: "empty value".to_string(),
                });
            } else {
                *field = Some(value.to_string());
                last_offset = offset;
            }
            continue;
        }

        last_offset = offset;
        snapshot.entries.push(LogEntry {
            line: raw.number,
            session: current.map(|_| snapshot.sessions.len()),
            offset,
            compressed: parsed.compressed,
            payload: parsed.payload,
        });
    }
    parser.finish(sink);

    if let Some(start) = current {
        snapshot.sessions.push(Session {
            start,
            elapsed: last_offset,
        });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay_str(text: &str) -> (Snapshot, Vec<Warning>) {
        let mut codec = CompressionContext::default();
        let mut warnings: Vec<Warning> = Vec::new();
        let snapshot = replay_reader(text.as_bytes(), &mut codec, &mut warnings).unwrap();
        (snapshot, warnings)
    }

    #[test]
    fn test_empty_log() {
        let (snapshot, warnings) = replay_str("");
        assert_eq!(snapshot, Snapshot::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_identity_fields_are_not_entries() {
        let (snapshot, _) = replay_str(
            "T0 now: 2026-01-20T10:00:00+00:00\n\
             T0.5 site: https://www.nytimes.com/games/wordle\n\
             T0.6 puzzle_id: 1234\n\
             T2 guess: crane\n",
        );
        assert_eq!(
            snapshot.site.as_deref(),
            Some("https://www.nytimes.com/games/wordle")
        );
        assert_eq!(snapshot.puzzle_id.as_deref(), Some("1234"));
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].payload, "guess: crane");
        assert_eq!(snapshot.entries[0].session, Some(0));
    }

    #[test]
    fn test_session_with_only_marker_has_zero_elapsed() {
        let (snapshot, _) = replay_str("T0 now: 2026-01-20T10:00:00+00:00\n");
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.sessions[0].elapsed, 0.0);
    }

    #[test]
    fn test_trailing_lines_set_open_session_elapsed() {
        let (snapshot, _) = replay_str(
            "T0 now: 2026-01-20T10:00:00+00:00\n\
             T3 guess: crane\n\
             T8.5 guess: slate\n",
        );
        assert_eq!(snapshot.sessions[0].elapsed, 8.5);
    }

    #[test]
    fn test_bad_marker_is_skipped() {
        let (snapshot, warnings) = replay_str(
            "T0 now: yesterday-ish\n\
             T1 guess: crane\n",
        );
        assert!(snapshot.sessions.is_empty());
        assert_eq!(snapshot.entries[0].session, None);
        assert!(matches!(warnings[0], Warning::BadEvent { line: 1, .. }));
    }

    #[test]
    fn test_compressed_marker_is_ordinary_payload() {
        let mut writer = CompressionContext::default();
        let encoded = writer.encode(b"now: 2026-01-21T10:00:00+00:00").unwrap();
        let text = format!("T0 now: 2026-01-20T10:00:00+00:00\nT4Z {encoded}\n");

        let (snapshot, _) = replay_str(&text);

        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.entries[0].payload, "now: 2026-01-21T10:00:00+00:00");
    }

    #[test]
    fn test_unterminated_final_line_is_ignored() {
        let (snapshot, warnings) = replay_str(
            "T0 now: 2026-01-20T10:00:00+00:00\n\
             T2 guess: crane\n\
             T3 guess: sl",
        );
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.lines, 3);
        assert_eq!(warnings, vec![Warning::Unterminated { line: 3 }]);
    }

    #[test]
    fn test_empty_identity_value_warns() {
        let (snapshot, warnings) = replay_str("T0 site:   \n");
        assert_eq!(snapshot.site, None);
        assert_eq!(warnings.len(), 1);
    }
}
