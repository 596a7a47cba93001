use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::codec::CompressionContext;
use crate::error::StoreError;
use crate::replay;
use crate::warning::WarningSink;

pub const LOG_EXTENSION: &str = "log";

/// One log file as seen by [`LogDir::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    pub path: PathBuf,
    pub start: Option<DateTime<FixedOffset>>,
    pub site: Option<String>,
    pub puzzle_id: Option<String>,
    pub sessions: usize,
    pub entries: usize,
    pub total_elapsed: f64,
    pub corrupt_lines: usize,
}

/// The directory holding in-progress logs.
pub struct LogDir {
    dir: PathBuf,
}

impl LogDir {
    /// Use the default directory, `<data_dir>/wordlog/logs`.
    pub fn new() -> Result<Self, StoreError> {
        let data_dir = dirs::data_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self {
            dir: data_dir.join("wordlog").join("logs"),
        })
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Summarize every log in the directory, newest session start first.
    /// Unreadable files are skipped with a warning.
    pub fn list(&self, sink: &mut dyn WarningSink) -> Result<Vec<LogSummary>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::file(&self.dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| StoreError::file(&self.dir, e))?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }

            let mut codec = CompressionContext::default();
            match replay::replay(&path, &mut codec, sink) {
                Ok(snapshot) => summaries.push(LogSummary {
                    total_elapsed: snapshot.total_elapsed(),
                    path,
                    start: snapshot.start,
                    site: snapshot.site,
                    puzzle_id: snapshot.puzzle_id,
                    sessions: snapshot.sessions.len(),
                    entries: snapshot.entries.len(),
                    corrupt_lines: snapshot.corrupt_lines,
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read log"),
            }
        }

        summaries.sort_by(|a, b| b.start.cmp(&a.start).then_with(|| b.path.cmp(&a.path)));
        Ok(summaries)
    }

    /// A new, unused file name derived from the current UTC time and the
    /// puzzle's identity.
    pub fn fresh_path(&self, site: &str, puzzle_id: &str) -> PathBuf {
        self.fresh_path_at(Utc::now(), site, puzzle_id)
    }

    pub fn fresh_path_at(&self, now: DateTime<Utc>, site: &str, puzzle_id: &str) -> PathBuf {
        let timestamp_str = now.format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(site.as_bytes());
        hasher.update(b"\n");
        hasher.update(puzzle_id.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let short_hash = &hash[..6];

        self.dir
            .join(format!("{}_{}.{}", timestamp_str, short_hash, LOG_EXTENSION))
    }
}
