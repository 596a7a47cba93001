//! Replayable, crash-safe session logs for word-puzzle assistants.
//!
//! A log is a text file of `T<seconds>[Z] <payload>` lines. Every user
//! action is appended as one complete line, so a log interrupted at any
//! point still replays. Replaying a log rebuilds the solver's state;
//! finished logs are committed into a version-controlled archive.

mod archive;
mod atomic;
mod codec;
mod cursor;
mod dispatch;
mod error;
mod logdir;
mod parser;
mod replay;
mod stored;
pub mod timestamp;
mod warning;
mod writer;

pub use archive::{archive_log, archive_path, site_key};
pub use atomic::{atomic_file, atomic_file_with_backup, atomic_rewrite, backup_old, create_exclusive};
pub use codec::{CodecError, CompressionContext};
pub use cursor::{CursorLine, ForkOutcome, LogCursor, Needle};
pub use dispatch::{Dispatch, DispatchStats, Dispatcher, Event, Handler, Matcher};
pub use error::StoreError;
pub use logdir::{LogDir, LogSummary, LOG_EXTENSION};
pub use parser::{format_line, LineParser, ParsedLine, RawLine, RawLines, COMPRESSED_MARKER};
pub use replay::{
    replay, replay_reader, LogEntry, Session, Snapshot, PUZZLE_ID_PREFIX, SITE_PREFIX,
};
pub use stored::StoredLog;
pub use warning::{IgnoreWarnings, TracingSink, Warning, WarningSink};
pub use writer::{CompressPolicy, SessionLog, NOW_PREFIX};
