use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use regex::Regex;

use wordlog_git::GitArchive;
use wordlog_logging::{LogEvent, Logger};
use wordlog_store::{
    replay, CompressionContext, LogCursor, LogDir, Needle, StoredLog,
};

use crate::config::Settings;
use crate::output::{print_line, print_logs_table, print_snapshot, LoggerSink};
use crate::play;

/// How `seek` picks its line.
#[derive(Debug, Clone, PartialEq)]
pub enum SeekTarget {
    Line(i64),
    Session(i64),
    Find(String),
    Regex(String),
}

pub fn handle_play(
    file: Option<PathBuf>,
    site: Option<String>,
    puzzle: Option<String>,
    settings: &Settings,
    logger: &Logger,
    interrupted: &AtomicBool,
) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => {
            let dir = LogDir::with_dir(&settings.log_dir);
            dir.fresh_path(
                site.as_deref().unwrap_or_default(),
                puzzle.as_deref().unwrap_or_default(),
            )
        }
    };

    // Identity flags are recorded as the first commands of the session.
    let mut preamble = String::new();
    if let Some(site) = &site {
        preamble.push_str(&format!(":site {}\n", site));
    }
    if let Some(puzzle) = &puzzle {
        preamble.push_str(&format!(":puzzle {}\n", puzzle));
    }

    let stdin = io::stdin();
    let mut input = io::Cursor::new(preamble).chain(stdin.lock());
    let mut out = io::stdout();
    let policy = settings.policy;

    eprintln!(
        "{} {}  {}",
        "Recording to".dimmed(),
        path.display(),
        "(:site, :puzzle, :fork N, :quit)".dimmed()
    );
    let last = play::play(
        &path,
        |p| StoredLog::with_policy(p, policy),
        &mut input,
        &mut out,
        logger,
        interrupted,
    )?;
    eprintln!("{} {}", "Log saved at".bright_green(), last.display());
    Ok(())
}

pub fn handle_replay(file: &Path, json: bool, logger: &Logger) -> Result<()> {
    let mut sink = LoggerSink::new(logger);
    let mut codec = CompressionContext::default();
    let snapshot = replay(file, &mut codec, &mut sink)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    logger.log(&LogEvent::ReplayFinished {
        path: file.to_path_buf(),
        lines: snapshot.lines,
        entries: snapshot.entries.len(),
        sessions: snapshot.sessions.len(),
        elapsed_secs: snapshot.total_elapsed(),
        corrupt_lines: snapshot.corrupt_lines,
    });
    Ok(())
}

pub fn handle_seek(
    file: &Path,
    target: SeekTarget,
    from: Option<i64>,
    json: bool,
    logger: &Logger,
) -> Result<()> {
    let mut sink = LoggerSink::new(logger);
    let mut cursor = LogCursor::open(file, &mut sink)?;
    let empty = cursor.is_empty();
    if let Some(from) = from {
        cursor.seek(from);
    }

    let found = match target {
        SeekTarget::Line(n) => cursor.seek(n),
        SeekTarget::Session(n) => cursor.session(n),
        SeekTarget::Find(text) => cursor.find(&Needle::Text(text)),
        SeekTarget::Regex(pattern) => {
            let regex = Regex::new(&pattern)
                .with_context(|| format!("Invalid --regex pattern {:?}", pattern))?;
            cursor.find(&Needle::Pattern(regex))
        }
    };

    match found {
        Some(line) if json => println!("{}", serde_json::to_string_pretty(line)?),
        Some(line) => print_line(line),
        None if empty => bail!("{} is empty", file.display()),
        None => bail!("No matching line in {}", file.display()),
    }
    Ok(())
}

pub fn handle_fork(file: &Path, line: i64, to: &Path, logger: &Logger) -> Result<()> {
    let mut sink = LoggerSink::new(logger);
    let mut cursor = LogCursor::open(file, &mut sink)?;
    cursor.seek(line);
    let outcome = cursor.fork(to)?;

    logger.log(&LogEvent::Forked {
        from: file.to_path_buf(),
        to: outcome.path.clone(),
        line: cursor.position(),
        backup: outcome.backup.clone(),
    });
    println!("{}", outcome.path.display());
    Ok(())
}

pub fn handle_archive(file: &Path, settings: &Settings, logger: &Logger) -> Result<()> {
    if !file.exists() {
        bail!("No such log: {}", file.display());
    }
    let mut archive = GitArchive::open_or_init(&settings.archive_dir).with_context(|| {
        format!(
            "Failed to open archive repository at {}",
            settings.archive_dir.display()
        )
    })?;
    let root = archive.root().to_path_buf();

    let mut sink = LoggerSink::new(logger);
    let mut log = StoredLog::with_policy(file, settings.policy);
    let dest = log.archive(&mut archive, &root, &mut sink)?;

    logger.log(&LogEvent::Archived {
        from: file.to_path_buf(),
        to: dest.clone(),
    });
    println!("{}", dest.display());
    Ok(())
}

pub fn handle_list(json: bool, settings: &Settings, logger: &Logger) -> Result<()> {
    let mut sink = LoggerSink::new(logger);
    let summaries = LogDir::with_dir(&settings.log_dir).list(&mut sink)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else if summaries.is_empty() {
        println!("{}", "No logs found.".dimmed());
    } else {
        print_logs_table(&summaries);
    }
    Ok(())
}
