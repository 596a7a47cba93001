//! # wordlog-git
//!
//! The archive side of wordlog: finished puzzle logs are committed into a
//! git repository so their history is durable.
//!
//! ## Key Types
//!
//! - [`Archive`] - The narrow interface the store needs from a history-preserving backend
//! - [`GitArchive`] - [`Archive`] over a git2 repository
//! - [`Transaction`] - Staged, all-or-nothing change set
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wordlog_git::{transact, GitArchive};
//!
//! let mut archive = GitArchive::open_or_init(&archive_root)?;
//! transact(&mut archive, "nyt 1234", |txn| {
//!     txn.will_add(&dest, |dest| std::fs::copy(&live, dest).map(|_| ()).map_err(Into::into))
//! })?;
//! ```
//!
//! A failed body restores every staged path from the last commit before the
//! error propagates, and a transaction with nothing staged never calls into
//! the archive.

mod archive;
mod transaction;

pub use archive::{Archive, ArchiveError, GitArchive};
pub use transaction::{transact, Transaction};
