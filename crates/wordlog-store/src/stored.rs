//! A log file bound to its replayed state and, while a session is open,
//! its writer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local};
use tracing::{debug, info};

use crate::atomic::create_exclusive;
use crate::codec::CompressionContext;
use crate::error::StoreError;
use crate::replay::{self, Session, Snapshot, PUZZLE_ID_PREFIX, SITE_PREFIX};
use crate::warning::WarningSink;
use crate::writer::{CompressPolicy, SessionLog};

#[derive(Debug)]
pub struct StoredLog {
    log_file: PathBuf,
    start: Option<DateTime<FixedOffset>>,
    site: Option<String>,
    puzzle_id: Option<String>,
    sessions: Vec<Session>,
    loaded: bool,
    codec: CompressionContext,
    writer: Option<SessionLog>,
    policy: CompressPolicy,
}

impl StoredLog {
    pub fn new(log_file: impl Into<PathBuf>) -> Self {
        Self::with_policy(log_file, CompressPolicy::default())
    }

    pub fn with_policy(log_file: impl Into<PathBuf>, policy: CompressPolicy) -> Self {
        Self {
            log_file: log_file.into(),
            start: None,
            site: None,
            puzzle_id: None,
            sessions: Vec::new(),
            loaded: false,
            codec: CompressionContext::default(),
            writer: None,
            policy,
        }
    }

    /// Start a brand new log at `path`. Anything already there is moved
    /// aside first. Returns the backup path, if one was made.
    pub fn create(&mut self, path: &Path) -> Result<Option<PathBuf>, StoreError> {
        if let Some(writer) = &self.writer {
            return Err(StoreError::AlreadyLogging(writer.path().to_path_buf()));
        }
        let (_file, backup) = create_exclusive(path).map_err(|e| StoreError::file(path, e))?;
        self.rebind(path.to_path_buf());
        self.clear();
        self.loaded = true;
        Ok(backup)
    }

    /// Replay the file and adopt its state. A missing file is an empty log.
    pub fn load(&mut self, sink: &mut dyn WarningSink) -> Result<Snapshot, StoreError> {
        if let Some(writer) = &self.writer {
            return Err(StoreError::AlreadyLogging(writer.path().to_path_buf()));
        }
        let snapshot = if self.log_file.exists() {
            replay::replay(&self.log_file, &mut self.codec, sink)?
        } else {
            self.codec.reset();
            Snapshot::default()
        };
        self.start = snapshot.start;
        self.site = snapshot.site.clone();
        self.puzzle_id = snapshot.puzzle_id.clone();
        self.sessions = snapshot.sessions.clone();
        self.loaded = true;
        Ok(snapshot)
    }

    pub fn open_session(&mut self, sink: &mut dyn WarningSink) -> Result<(), StoreError> {
        self.open_session_at(Local::now().fixed_offset(), sink)
    }

    /// Open a session starting at `now`. The file is replayed first if
    /// this handle has not loaded it yet, so the compressor picks up where
    /// the file left off.
    pub fn open_session_at(
        &mut self,
        now: DateTime<FixedOffset>,
        sink: &mut dyn WarningSink,
    ) -> Result<(), StoreError> {
        if let Some(writer) = &self.writer {
            return Err(StoreError::AlreadyLogging(writer.path().to_path_buf()));
        }
        if !self.loaded {
            self.load(sink)?;
        }
        let writer = SessionLog::open(&self.log_file, now, self.policy)?;
        self.start.get_or_insert(now);
        self.writer = Some(writer);
        info!(path = %self.log_file.display(), resumed = !self.sessions.is_empty(), "Session opened");
        Ok(())
    }

    /// Record one solver event in the open session.
    pub fn log(&mut self, message: &str) -> Result<f64, StoreError> {
        let writer = self.writer.as_mut().ok_or(StoreError::NotLogging)?;
        writer.record(message, &mut self.codec)
    }

    pub fn set_site(&mut self, site: &str) -> Result<(), StoreError> {
        self.log(&format!("{SITE_PREFIX} {site}"))?;
        self.site = Some(site.to_string());
        Ok(())
    }

    pub fn set_puzzle_id(&mut self, puzzle_id: &str) -> Result<(), StoreError> {
        self.log(&format!("{PUZZLE_ID_PREFIX} {puzzle_id}"))?;
        self.puzzle_id = Some(puzzle_id.to_string());
        Ok(())
    }

    /// Close the open session, if any, and return its accounting.
    pub fn close(&mut self) -> Result<Option<Session>, StoreError> {
        let Some(writer) = self.writer.take() else {
            return Ok(None);
        };
        let start = writer.started_at();
        let elapsed = writer.close()?;
        let session = Session { start, elapsed };
        self.sessions.push(session.clone());
        debug!(path = %self.log_file.display(), elapsed, "Session closed");
        Ok(Some(session))
    }

    pub fn is_logging(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// No session is open for append on this handle.
    pub fn is_ephemeral(&self) -> bool {
        self.writer.is_none()
    }

    /// Time across closed sessions plus the open one so far.
    pub fn total_elapsed(&self) -> f64 {
        let closed: f64 = self.sessions.iter().map(|s| s.elapsed).sum();
        closed + self.writer.as_ref().map_or(0.0, |w| w.last_offset())
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn start(&self) -> Option<DateTime<FixedOffset>> {
        self.start
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    pub fn puzzle_id(&self) -> Option<&str> {
        self.puzzle_id.as_deref()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub(crate) fn rebind(&mut self, path: PathBuf) {
        self.log_file = path;
    }

    fn clear(&mut self) {
        self.start = None;
        self.site = None;
        self.puzzle_id = None;
        self.sessions.clear();
        self.codec.reset();
    }
}

impl Drop for StoredLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close session on drop");
        }
    }
}
